//! The bundled demo workflows and their steps.

use std::time::Duration;

use chainflow_core::{CancellationToken, ExecutionContext, FanOut, Step, Workflow, WorkflowBuilder};
use chainflow_types::config::EngineConfig;
use chainflow_types::error::{StepError, WorkflowError};
use chainflow_types::event::WorkflowEvent;
use chainflow_types::workflow::Fault;

/// Event the `event` demo waits for.
pub const APPROVAL_EVENT: &str = "order.approved";

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Passes a number through, recording it in the context.
pub struct ReadNumber;

impl Step for ReadNumber {
    type Input = u32;
    type Output = u32;

    fn name(&self) -> &str {
        "read_number"
    }

    async fn run(
        &self,
        input: u32,
        ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<u32, StepError> {
        ctx.set("input", input).map_err(|e| StepError::failed(e.to_string()))?;
        Ok(input)
    }
}

/// Announces graduation from `school`.
pub struct Graduate {
    pub school: &'static str,
}

impl Step for Graduate {
    type Input = u32;
    type Output = String;

    fn name(&self) -> &str {
        self.school
    }

    async fn run(
        &self,
        _age: u32,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        Ok(format!("graduating {}", self.school))
    }
}

/// Returns its input unchanged.
pub struct Finish;

impl Step for Finish {
    type Input = String;
    type Output = String;

    fn name(&self) -> &str {
        "finish"
    }

    async fn run(
        &self,
        input: String,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        Ok(input)
    }
}

pub struct Seed;

impl Step for Seed {
    type Input = ();
    type Output = String;

    fn name(&self) -> &str {
        "seed"
    }

    async fn run(
        &self,
        _input: (),
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        Ok("1".to_string())
    }
}

/// Appends `suffix` after waiting `after`.
pub struct Append {
    pub suffix: &'static str,
    pub after: Duration,
}

impl Step for Append {
    type Input = String;
    type Output = String;

    fn name(&self) -> &str {
        "append"
    }

    async fn run(
        &self,
        input: String,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        tokio::time::sleep(self.after).await;
        Ok(format!("{input}{}", self.suffix))
    }
}

pub struct Join;

impl Step for Join {
    type Input = Vec<String>;
    type Output = Vec<String>;

    fn name(&self) -> &str {
        "join"
    }

    async fn run(
        &self,
        input: Vec<String>,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<Vec<String>, StepError> {
        Ok(input)
    }
}

/// Sleeps in small slices, giving up once the run is cancelled.
pub struct SlowWork {
    pub total: Duration,
}

impl Step for SlowWork {
    type Input = u32;
    type Output = u32;

    fn name(&self) -> &str {
        "slow_work"
    }

    async fn run(
        &self,
        input: u32,
        _ctx: &ExecutionContext,
        token: &CancellationToken,
    ) -> Result<u32, StepError> {
        let slice = Duration::from_millis(50);
        let mut elapsed = Duration::ZERO;
        while elapsed < self.total {
            if token.is_cancelled() {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "slow work abandoned");
                return Err(StepError::Cancelled);
            }
            tokio::time::sleep(slice).await;
            elapsed += slice;
        }
        Ok(input)
    }
}

pub struct Double;

impl Step for Double {
    type Input = u32;
    type Output = u32;

    fn name(&self) -> &str {
        "double"
    }

    async fn run(
        &self,
        input: u32,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<u32, StepError> {
        Ok(input * 2)
    }
}

pub struct AlwaysFails;

impl Step for AlwaysFails {
    type Input = ();
    type Output = String;

    fn name(&self) -> &str {
        "always_fails"
    }

    async fn run(
        &self,
        _input: (),
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        Err(StepError::failed("boom"))
    }
}

pub struct CaptureFault;

impl Step for CaptureFault {
    type Input = Fault;
    type Output = String;

    fn name(&self) -> &str {
        "capture_fault"
    }

    async fn run(
        &self,
        fault: Fault,
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        Ok(format!("Captured: {fault}"))
    }
}

pub struct Approved;

impl Step for Approved {
    type Input = (WorkflowEvent, u32);
    type Output = String;

    fn name(&self) -> &str {
        "approved"
    }

    async fn run(
        &self,
        (event, order): (WorkflowEvent, u32),
        _ctx: &ExecutionContext,
        _token: &CancellationToken,
    ) -> Result<String, StepError> {
        let by = event.data["by"].as_str().unwrap_or("unknown");
        Ok(format!("order {order} approved by {by}"))
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

pub fn age(config: EngineConfig) -> Result<Workflow<u32, String>, WorkflowError> {
    WorkflowBuilder::new("age")
        .with_config(config)
        .start_with(ReadNumber)
        .when(|age: &u32| *age == 18)
        .execute(Graduate {
            school: "Highschool",
        })
        .or_when(|age: &u32| *age == 22)
        .execute(Graduate { school: "College" })
        .or_when(|age: &u32| *age == 60)
        .execute(Graduate {
            school: "Retirement",
        })
        .otherwise()
        .execute(Graduate {
            school: "UnknownAge",
        })
        .end_if()
        .end_with(Finish)
        .build()
}

pub fn parallel(config: EngineConfig) -> Result<Workflow<(), Vec<String>>, WorkflowError> {
    WorkflowBuilder::new("parallel")
        .with_config(config)
        .start_with(Seed)
        .parallel(
            FanOut::new()
                .step(Append {
                    suffix: ",2",
                    after: Duration::from_millis(300),
                })
                .step(Append {
                    suffix: ",3",
                    after: Duration::from_millis(100),
                }),
        )
        .end_with(Join)
        .build()
}

pub fn expire(config: EngineConfig) -> Result<Workflow<u32, u32>, WorkflowError> {
    WorkflowBuilder::new("expire")
        .with_config(config)
        .start_with(ReadNumber)
        .then(SlowWork {
            total: Duration::from_millis(1_000),
        })
        .end_with(Double)
        .expire(500)
        .build()
}

pub fn stop(config: EngineConfig) -> Result<Workflow<u32, u32>, WorkflowError> {
    WorkflowBuilder::new("stop")
        .with_config(config)
        .start_with(ReadNumber)
        .when(|x: &u32| *x == 99)
        .stop()
        .otherwise()
        .execute(Double)
        .end_if()
        .end_with(Double)
        .build()
}

pub fn fault(config: EngineConfig) -> Result<Workflow<(), String>, WorkflowError> {
    WorkflowBuilder::new("fault")
        .with_config(config)
        .start_with(AlwaysFails)
        .on_failure()
        .continue_with(CaptureFault)
        .end_with(Finish)
        .build()
}

pub fn event(config: EngineConfig) -> Result<Workflow<u32, String>, WorkflowError> {
    WorkflowBuilder::new("event")
        .with_config(config)
        .start_with(ReadNumber)
        .wait(APPROVAL_EVENT)
        .end_with(Approved)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn age_demo_branches() {
        let workflow = age(EngineConfig::default()).unwrap();
        assert_eq!(workflow.run(18, None).await.unwrap(), "graduating Highschool");
        assert_eq!(workflow.run(22, None).await.unwrap(), "graduating College");
        assert_eq!(workflow.run(60, None).await.unwrap(), "graduating Retirement");
        assert_eq!(workflow.run(5, None).await.unwrap(), "graduating UnknownAge");
        assert_eq!(workflow.context().get::<u32>("input").unwrap(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_demo_joins_in_order() {
        let workflow = parallel(EngineConfig::default()).unwrap();
        assert_eq!(workflow.run((), None).await.unwrap(), vec!["1,2", "1,3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_demo_expires() {
        let workflow = expire(EngineConfig::default()).unwrap();
        let err = workflow.run(1, None).await.unwrap_err();
        assert_eq!(err, WorkflowError::Expired { ms: 500 });
    }

    #[tokio::test(start_paused = true)]
    async fn stop_demo_stops_on_99() {
        let workflow = stop(EngineConfig::default()).unwrap();
        assert_eq!(workflow.run(99, None).await.unwrap_err(), WorkflowError::Stopped);
        assert_eq!(workflow.run(3, None).await.unwrap(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn fault_demo_captures() {
        let workflow = fault(EngineConfig::default()).unwrap();
        assert_eq!(workflow.run((), None).await.unwrap(), "Captured: boom");
    }

    #[tokio::test(start_paused = true)]
    async fn event_demo_resumes_on_approval() {
        let workflow = std::sync::Arc::new(event(EngineConfig::default()).unwrap());
        let bus = workflow.event_bus().clone();
        let runner = std::sync::Arc::clone(&workflow);
        let task = tokio::spawn(async move { runner.run(42, None).await });

        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.emit(APPROVAL_EVENT, json!({"by": "ops"}));
        assert_eq!(task.await.unwrap().unwrap(), "order 42 approved by ops");
    }
}
