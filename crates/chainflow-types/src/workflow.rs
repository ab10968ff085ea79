//! Workflow run types: status tracking and captured faults.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WorkflowStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow.
///
/// `Pending` at construction, `Running` once `run()` is called, `Waiting`
/// while suspended on an event-wait node. `Completed`, `Faulted` and
/// `Stopped` are terminal and set once per run, when the run settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Waiting,
    Completed,
    Faulted,
    Stopped,
}

impl WorkflowStatus {
    /// Whether the status is one a run settles into.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Faulted | WorkflowStatus::Stopped
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Waiting => "waiting",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Faulted => "faulted",
            WorkflowStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Fault
// ---------------------------------------------------------------------------

/// A captured step failure, handed to a compensation or failure step in place
/// of the normal input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Message of the original error.
    pub error: String,
}

impl Fault {
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}
