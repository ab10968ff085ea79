//! Opt-in retry for sequential nodes.
//!
//! A node with a [`RetryPolicy`] re-invokes its step after a fixed interval
//! whenever the step fails, until it succeeds, the run is cancelled, or the
//! attempt budget is spent (the "terminate" outcome, which propagates the last
//! error). Engine failures such as timeouts are never retried.

use std::time::Duration;

use chainflow_types::error::WorkflowError;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::step::{SharedStep, spawn_step};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Retry every `interval`, optionally bounded by `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between a failure and the next attempt.
    pub interval: Duration,
    /// Total attempts including the first; `None` retries until success or
    /// cancellation.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

// ---------------------------------------------------------------------------
// RetryAction
// ---------------------------------------------------------------------------

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Sleep for the given duration, then re-invoke the step.
    Retry { after: Duration },
    /// Give up and propagate the error.
    Terminate,
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry logic; all configuration comes in through parameters.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt is allowed.
    ///
    /// `attempt` is 1-based (first execution is attempt 1). Only step
    /// failures are retryable.
    pub fn should_retry(policy: &RetryPolicy, attempt: u32, error: &WorkflowError) -> bool {
        error.is_step_failure() && policy.max_attempts.is_none_or(|max| attempt < max)
    }

    pub fn next_action(policy: &RetryPolicy, attempt: u32, error: &WorkflowError) -> RetryAction {
        if Self::should_retry(policy, attempt, error) {
            RetryAction::Retry {
                after: policy.interval,
            }
        } else {
            RetryAction::Terminate
        }
    }

    /// Run `step`, re-invoking it per `policy` on failure.
    pub(crate) async fn run(
        step: &SharedStep,
        policy: Option<&RetryPolicy>,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, WorkflowError> {
        let Some(policy) = policy else {
            return spawn_step(step.clone(), input, ctx.clone()).await;
        };

        let mut attempt = 1;
        loop {
            let err = match spawn_step(step.clone(), input.clone(), ctx.clone()).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            match Self::next_action(policy, attempt, &err) {
                RetryAction::Terminate => return Err(err),
                RetryAction::Retry { after } => {
                    tracing::warn!(
                        step = step.name(),
                        attempt,
                        error = %err,
                        retry_in_ms = after.as_millis() as u64,
                        "step failed, retrying"
                    );
                    tokio::time::sleep(after).await;
                    if ctx.cancellation_source().is_cancelled() {
                        return Err(WorkflowError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chainflow_types::error::StepError;

    use crate::cancellation::CancellationToken;
    use crate::step::{share, step_fn};

    fn step_failure() -> WorkflowError {
        WorkflowError::Step(StepError::failed("boom"))
    }

    /// Step that fails until it has been called `succeed_on` times.
    fn flaky(succeed_on: u32) -> (SharedStep, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let step = step_fn(move |_: (), _ctx: ExecutionContext, _token: CancellationToken| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n >= succeed_on {
                    Ok(n)
                } else {
                    Err(StepError::failed(format!("attempt {n} failed")))
                }
            }
        });
        (share(step), calls)
    }

    // -------------------------------------------------------------------
    // should_retry / next_action
    // -------------------------------------------------------------------

    #[test]
    fn test_should_retry_within_limit() {
        let policy = RetryPolicy::every(Duration::from_millis(10)).with_max_attempts(3);
        assert!(RetryHandler::should_retry(&policy, 1, &step_failure()));
        assert!(RetryHandler::should_retry(&policy, 2, &step_failure()));
    }

    #[test]
    fn test_should_not_retry_at_max() {
        let policy = RetryPolicy::every(Duration::from_millis(10)).with_max_attempts(3);
        assert!(!RetryHandler::should_retry(&policy, 3, &step_failure()));
        assert!(!RetryHandler::should_retry(&policy, 4, &step_failure()));
    }

    #[test]
    fn test_unbounded_policy_always_retries_step_failures() {
        let policy = RetryPolicy::every(Duration::from_millis(10));
        assert!(RetryHandler::should_retry(&policy, 1_000, &step_failure()));
    }

    #[test]
    fn test_engine_failures_are_not_retried() {
        let policy = RetryPolicy::every(Duration::from_millis(10));
        assert!(!RetryHandler::should_retry(&policy, 1, &WorkflowError::Cancelled));
        assert!(!RetryHandler::should_retry(
            &policy,
            1,
            &WorkflowError::TimedOut { ms: 5 }
        ));
    }

    #[test]
    fn test_next_action() {
        let policy = RetryPolicy::every(Duration::from_millis(25)).with_max_attempts(2);
        assert_eq!(
            RetryHandler::next_action(&policy, 1, &step_failure()),
            RetryAction::Retry {
                after: Duration::from_millis(25)
            }
        );
        assert_eq!(
            RetryHandler::next_action(&policy, 2, &step_failure()),
            RetryAction::Terminate
        );
    }

    // -------------------------------------------------------------------
    // run
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let (step, calls) = flaky(3);
        let policy = RetryPolicy::every(Duration::from_millis(100));
        let ctx = ExecutionContext::new();

        let output = RetryHandler::run(&step, Some(&policy), Value::Null, &ctx)
            .await
            .unwrap();

        assert_eq!(output, serde_json::json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_terminates_after_max_attempts() {
        let (step, calls) = flaky(10);
        let policy = RetryPolicy::every(Duration::from_millis(100)).with_max_attempts(2);
        let ctx = ExecutionContext::new();

        let err = RetryHandler::run(&step, Some(&policy), Value::Null, &ctx)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "attempt 2 failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_policy_is_single_attempt() {
        let (step, calls) = flaky(2);
        let ctx = ExecutionContext::new();

        let err = RetryHandler::run(&step, None, Value::Null, &ctx).await;
        assert!(err.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_cancelled() {
        let (step, calls) = flaky(u32::MAX);
        let policy = RetryPolicy::every(Duration::from_millis(100));
        let ctx = ExecutionContext::new();

        let source = ctx.cancellation_source();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            source.cancel();
        });

        let err = RetryHandler::run(&step, Some(&policy), Value::Null, &ctx)
            .await
            .unwrap_err();

        assert_eq!(err, WorkflowError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
