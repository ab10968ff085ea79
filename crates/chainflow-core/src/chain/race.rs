//! The delay/timeout race shared by every timed node.
//!
//! The unit of work is `sleep(delay)` followed by the node's work. When a
//! timeout is configured the unit races a deadline: the deadline winning
//! cancels the run's source and drops the unit. A pending delay therefore
//! never reaches the work; work already spawned as a task is detached and its
//! result discarded.

use std::future::Future;

use chainflow_types::error::WorkflowError;
use serde_json::Value;

use crate::cancellation::CancellationSource;

use super::node::Timing;

pub(crate) async fn race<F, Fut>(
    timing: Timing,
    source: &CancellationSource,
    work: F,
) -> Result<Value, WorkflowError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, WorkflowError>>,
{
    if source.is_cancelled() {
        return Err(WorkflowError::Cancelled);
    }

    let unit = async {
        if let Some(delay) = timing.delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
            if source.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
        }
        work().await
    };

    let Some(timeout) = timing.timeout else {
        return unit.await;
    };

    tokio::select! {
        biased;
        result = unit => result,
        () = tokio::time::sleep(timeout) => {
            source.cancel();
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "node timed out, cancelling run"
            );
            Err(WorkflowError::timed_out(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use serde_json::json;

    fn timing(delay_ms: Option<u64>, timeout_ms: Option<u64>) -> Timing {
        Timing {
            delay: delay_ms.map(Duration::from_millis),
            timeout: timeout_ms.map(Duration::from_millis),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_work_without_timing() {
        let source = CancellationSource::new();
        let output = race(Timing::default(), &source, || async { Ok(json!(1)) })
            .await
            .unwrap();
        assert_eq!(output, json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_runs_work() {
        let source = CancellationSource::new();
        source.cancel();
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);

        let err = race(Timing::default(), &source, || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .await
        .unwrap_err();

        assert_eq!(err, WorkflowError::Cancelled);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_shorter_than_delay_skips_work() {
        let source = CancellationSource::new();
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);

        let err = race(timing(Some(500), Some(100)), &source, || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .await
        .unwrap_err();

        assert_eq!(err, WorkflowError::TimedOut { ms: 100 });
        assert!(source.is_cancelled());
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_shorter_than_timeout_returns_output() {
        let source = CancellationSource::new();
        let started = tokio::time::Instant::now();

        let output = race(timing(Some(100), Some(500)), &source, || async {
            Ok(json!("done"))
        })
        .await
        .unwrap();

        assert_eq!(output, json!("done"));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!source.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out() {
        let source = CancellationSource::new();
        let err = race(timing(None, Some(50)), &source, || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        })
        .await
        .unwrap_err();

        assert_eq!(err, WorkflowError::TimedOut { ms: 50 });
        assert!(source.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_skips_work() {
        let source = CancellationSource::new();
        let canceller = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = race(timing(Some(100), None), &source, || async {
            Ok(Value::Null)
        })
        .await
        .unwrap_err();
        assert_eq!(err, WorkflowError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn work_errors_propagate_unmodified() {
        let source = CancellationSource::new();
        let err = race(timing(None, Some(1_000)), &source, || async {
            Err(WorkflowError::Internal("nope".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err, WorkflowError::Internal("nope".to_string()));
        assert!(!source.is_cancelled());
    }
}
