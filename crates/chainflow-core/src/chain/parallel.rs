//! Parallel node: fan the same input out to several steps and join.

use chainflow_types::error::WorkflowError;
use futures_util::future::try_join_all;
use serde_json::Value;

use crate::step::{SharedStep, spawn_step};

use super::node::{RunContext, Timing};
use super::race::race;

/// Runs every step concurrently on its own task. The output is an array in
/// declaration order regardless of completion order. The first failure wins;
/// siblings still running are detached, not aborted.
pub struct ParallelNode {
    pub(crate) steps: Vec<SharedStep>,
    pub(crate) timing: Timing,
}

impl ParallelNode {
    pub fn width(&self) -> usize {
        self.steps.len()
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        rt: &RunContext,
    ) -> Result<Value, WorkflowError> {
        race(self.timing, rt.source(), || async {
            tracing::debug!(width = self.steps.len(), "fanning out");
            let handles = self
                .steps
                .iter()
                .map(|step| spawn_step(step.clone(), input.clone(), rt.ctx.clone()))
                .collect::<Vec<_>>();
            let outputs = try_join_all(handles).await?;
            Ok(Value::Array(outputs))
        })
        .await
    }
}
