use std::time::Duration;

use thiserror::Error;

/// Failure raised by a user-supplied step.
///
/// Steps fail with whatever message describes their business error; the
/// engine wraps it in [`WorkflowError::Step`] and either hands it to a
/// compensation step or propagates it to the caller unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    /// The step observed the run's cancellation token and gave up.
    #[error("step observed cancellation")]
    Cancelled,
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Canonical failure kinds of a workflow run.
///
/// A run resolves with exactly one of these; the engine never reports partial
/// results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The cancellation token was already cancelled when a node was reached.
    #[error("the workflow was cancelled")]
    Cancelled,

    /// A single node's timeout fired before its work completed.
    #[error("a workflow step timed out after {ms} ms")]
    TimedOut { ms: u64 },

    /// The workflow-wide deadline fired.
    #[error("the workflow expired after {ms} ms")]
    Expired { ms: u64 },

    /// A conditional branch manually aborted the run.
    #[error("the workflow was manually stopped")]
    Stopped,

    /// Uncaught business failure raised by a step.
    #[error(transparent)]
    Step(#[from] StepError),

    /// No branch of a conditional node matched its input.
    #[error("no conditional branch matched the input")]
    NoBranchMatched,

    /// The chain handed to the workflow is malformed.
    #[error("invalid workflow chain: {0}")]
    InvalidChain(String),

    /// A payload could not be converted to or from a step's declared type.
    #[error("payload conversion failed: {0}")]
    Payload(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn timed_out(after: Duration) -> Self {
        Self::TimedOut {
            ms: after.as_millis() as u64,
        }
    }

    pub fn expired(after: Duration) -> Self {
        Self::Expired {
            ms: after.as_millis() as u64,
        }
    }

    /// Whether this is a business failure raised by a step, as opposed to a
    /// failure produced by the engine itself. Only step failures can be
    /// absorbed by compensation or retried.
    pub fn is_step_failure(&self) -> bool {
        matches!(self, WorkflowError::Step(_))
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Payload(err.to_string())
    }
}

/// Errors from loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: String, message: String },
}
