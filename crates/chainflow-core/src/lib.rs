//! Execution engine for chainflow workflows.
//!
//! A workflow is a singly linked chain of nodes (sequential, conditional,
//! parallel, event-wait, terminal) assembled once by [`builder`] and driven by
//! [`workflow::Workflow::run`]. Every node shares one [`context::ExecutionContext`]
//! and one cancellation source per run; per-node delays and timeouts and the
//! whole-workflow expiration are enforced by racing timers against the work.
//!
//! This crate depends only on `chainflow-types` plus async plumbing. Logging
//! setup lives in `chainflow-observe`.

pub mod builder;
pub mod cancellation;
pub mod chain;
pub mod config;
pub mod context;
pub mod event;
pub mod retry;
pub mod step;
pub mod workflow;

pub use builder::{ChainBuilder, FanOut, WorkflowBuilder};
pub use cancellation::{CancellationSource, CancellationToken};
pub use context::ExecutionContext;
pub use event::EventBus;
pub use retry::RetryPolicy;
pub use step::{Step, named_step_fn, step_fn};
pub use workflow::Workflow;
