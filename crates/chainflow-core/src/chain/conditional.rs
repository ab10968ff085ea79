//! Conditional node: ordered branches, exactly one of which runs.
//!
//! Branches are scanned in declaration order and the first whose predicate
//! holds (or the predicate-less `otherwise` branch) is selected. A `stop`
//! branch aborts the run without entering the delay/timeout race.

use std::sync::Arc;

use chainflow_types::error::WorkflowError;
use serde_json::Value;

use crate::step::{SharedStep, spawn_step};

use super::node::{RunContext, Timing};
use super::race::race;

/// Type-erased branch predicate over the node's input payload.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<bool, WorkflowError> + Send + Sync>;

pub struct Branch {
    /// `None` for an `otherwise` branch.
    pub(crate) predicate: Option<Predicate>,
    pub(crate) step: Option<SharedStep>,
    pub(crate) timing: Timing,
    pub(crate) stop: bool,
}

impl Branch {
    pub(crate) fn new(predicate: Option<Predicate>) -> Self {
        Self {
            predicate,
            step: None,
            timing: Timing::default(),
            stop: false,
        }
    }

    pub fn is_otherwise(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn is_stop(&self) -> bool {
        self.stop
    }

    fn matches(&self, input: &Value) -> Result<bool, WorkflowError> {
        match &self.predicate {
            Some(predicate) => predicate(input),
            None => Ok(true),
        }
    }
}

pub struct ConditionalNode {
    pub(crate) branches: Vec<Branch>,
}

impl ConditionalNode {
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Index of the first matching branch.
    pub(crate) fn select(&self, input: &Value) -> Result<usize, WorkflowError> {
        for (index, branch) in self.branches.iter().enumerate() {
            if branch.matches(input)? {
                return Ok(index);
            }
        }
        Err(WorkflowError::NoBranchMatched)
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        rt: &RunContext,
    ) -> Result<Value, WorkflowError> {
        let index = self.select(&input)?;
        let branch = &self.branches[index];

        if branch.stop {
            tracing::info!(branch = index, "branch requested stop, aborting run");
            return Err(WorkflowError::Stopped);
        }

        let Some(step) = &branch.step else {
            return Err(WorkflowError::Internal(format!(
                "conditional branch {index} has no step"
            )));
        };

        tracing::debug!(branch = index, step = step.name(), "branch selected");
        race(branch.timing, rt.source(), || {
            spawn_step(step.clone(), input, rt.ctx.clone())
        })
        .await
    }
}
