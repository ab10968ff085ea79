//! Shared domain types for chainflow.
//!
//! This crate contains the types shared between the engine, the observability
//! layer and the CLI: run status, faults, external events, the error taxonomy
//! and engine configuration.
//!
//! Zero runtime dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
