//! Executable chain nodes.
//!
//! The builder assembles a [`ChainNode`] list once; the workflow then runs it.
//! Each variant lives in its own module and shares the delay/timeout race in
//! [`race`].

pub mod conditional;
pub mod event_wait;
pub mod node;
pub mod parallel;
pub(crate) mod race;
pub mod sequential;
pub mod terminal;

pub use conditional::{Branch, ConditionalNode, Predicate};
pub use event_wait::EventWaitNode;
pub use node::{ChainNode, NodeKind, Timing};
pub use parallel::ParallelNode;
pub use sequential::SequentialNode;
pub use terminal::TerminalNode;
