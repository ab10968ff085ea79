//! Event bus for resuming suspended workflows.
//!
//! Provides an `EventBus` that delivers `WorkflowEvent` values to keyed
//! subscribers. Instances are constructed explicitly and injected into
//! workflows; there is no process-wide bus.

pub mod bus;

pub use bus::{EventBus, EventCallback};
