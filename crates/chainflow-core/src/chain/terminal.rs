//! Terminal node: the last step of a chain, plus the workflow deadline.

use std::time::Duration;

use chainflow_types::error::WorkflowError;
use serde_json::Value;

use crate::step::{SharedStep, spawn_step};

use super::node::{RunContext, Timing, run_with_fault};
use super::race::race;

pub struct TerminalNode {
    pub(crate) step: SharedStep,
    pub(crate) timing: Timing,
    /// Whole-workflow deadline, read by the workflow before the head runs.
    pub(crate) expiration: Option<Duration>,
    /// Notified with a `Fault` when `step` fails. Its output is discarded and
    /// the original failure still rejects the run.
    pub(crate) failure_step: Option<SharedStep>,
}

impl TerminalNode {
    pub(crate) fn new(step: SharedStep, timing: Timing) -> Self {
        Self {
            step,
            timing,
            expiration: None,
            failure_step: None,
        }
    }

    pub fn step_name(&self) -> &str {
        self.step.name()
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        rt: &RunContext,
    ) -> Result<Value, WorkflowError> {
        let result = race(self.timing, rt.source(), || {
            spawn_step(self.step.clone(), input, rt.ctx.clone())
        })
        .await;

        let err = match (result, &self.failure_step) {
            (Err(err), Some(_)) if err.is_step_failure() => err,
            (result, _) => return result,
        };
        if rt.source().is_cancelled() {
            tracing::debug!(
                step = self.step.name(),
                error = %err,
                "run cancelled, skipping failure step"
            );
            return Err(WorkflowError::Cancelled);
        }

        if let Some(failure_step) = &self.failure_step {
            match run_with_fault(failure_step, &err, rt).await {
                Ok(_) => tracing::info!(
                    step = self.step.name(),
                    failure_step = failure_step.name(),
                    "failure step notified"
                ),
                Err(notify_err) => tracing::error!(
                    step = self.step.name(),
                    failure_step = failure_step.name(),
                    error = %notify_err,
                    "failure step failed"
                ),
            }
        }
        Err(err)
    }
}
