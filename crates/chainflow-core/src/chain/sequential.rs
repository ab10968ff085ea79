//! Sequential node: one step, optional retry, optional compensation.

use chainflow_types::error::WorkflowError;
use serde_json::Value;

use crate::retry::{RetryHandler, RetryPolicy};
use crate::step::SharedStep;

use super::node::{RunContext, Timing, run_with_fault};
use super::race::race;

pub struct SequentialNode {
    pub(crate) step: SharedStep,
    pub(crate) timing: Timing,
    pub(crate) retry: Option<RetryPolicy>,
    /// Receives a `Fault` when the step fails; its output replaces the
    /// node's output.
    pub(crate) compensation: Option<SharedStep>,
}

impl SequentialNode {
    pub(crate) fn new(step: SharedStep, timing: Timing) -> Self {
        Self {
            step,
            timing,
            retry: None,
            compensation: None,
        }
    }

    pub fn step_name(&self) -> &str {
        self.step.name()
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        rt: &RunContext,
    ) -> Result<Value, WorkflowError> {
        let result = race(self.timing, rt.source(), || {
            RetryHandler::run(&self.step, self.retry.as_ref(), input, &rt.ctx)
        })
        .await;

        match (result, &self.compensation) {
            (Err(err), Some(compensation)) if err.is_step_failure() => {
                if rt.source().is_cancelled() {
                    tracing::debug!(
                        step = self.step.name(),
                        error = %err,
                        "run cancelled, skipping compensation step"
                    );
                    return Err(WorkflowError::Cancelled);
                }
                tracing::warn!(
                    step = self.step.name(),
                    compensation = compensation.name(),
                    error = %err,
                    "step failed, continuing with compensation step"
                );
                run_with_fault(compensation, &err, rt).await
            }
            (result, _) => result,
        }
    }
}
