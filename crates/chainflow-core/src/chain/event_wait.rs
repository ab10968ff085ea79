//! Event-wait node: suspend until a named event arrives on the bus.

use std::sync::Mutex;
use std::time::Duration;

use chainflow_types::error::WorkflowError;
use chainflow_types::event::WorkflowEvent;
use chainflow_types::workflow::WorkflowStatus;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::event::bus::SubscriptionGuard;

use super::node::RunContext;

/// Waits for the first event named `event_name`, then outputs the pair
/// `(event, input)`.
///
/// Unbounded unless a timeout is set here or through
/// `EngineConfig::event_wait_timeout_ms`. Delivery is at most once per
/// invocation: the subscription is dropped as soon as the node resumes.
pub struct EventWaitNode {
    pub(crate) event_name: String,
    pub(crate) timeout: Option<Duration>,
}

impl EventWaitNode {
    pub(crate) fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            timeout: None,
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) async fn execute(
        &self,
        input: Value,
        rt: &RunContext,
    ) -> Result<Value, WorkflowError> {
        let (tx, rx) = oneshot::channel::<WorkflowEvent>();
        let slot = Mutex::new(Some(tx));
        let wanted = self.event_name.clone();

        let key = Uuid::now_v7();
        rt.bus.subscribe(key, move |event: &WorkflowEvent| {
            if event.name != wanted {
                return;
            }
            let sender = match slot.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            if let Some(sender) = sender {
                let _ = sender.send(event.clone());
            }
        });
        let _subscription = SubscriptionGuard::new(rt.bus.clone(), key);

        rt.set_status(WorkflowStatus::Waiting);
        tracing::info!(event = self.event_name.as_str(), %key, "waiting for event");

        let token = rt.ctx.token();
        let wait = async {
            tokio::select! {
                received = rx => received.map_err(|_| {
                    WorkflowError::Internal("event subscription dropped".to_string())
                }),
                () = token.cancelled() => Err(WorkflowError::Cancelled),
            }
        };

        let bound = self.timeout.or(rt.event_wait_timeout).filter(|d| !d.is_zero());
        let received = match bound {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(received) => received,
                Err(_) => {
                    rt.source().cancel();
                    tracing::warn!(
                        event = self.event_name.as_str(),
                        timeout_ms = limit.as_millis() as u64,
                        "event wait timed out, cancelling run"
                    );
                    Err(WorkflowError::timed_out(limit))
                }
            },
        };

        let event = received?;
        rt.set_status(WorkflowStatus::Running);
        tracing::info!(event = event.name.as_str(), id = %event.id, "event received, resuming");

        Ok(serde_json::to_value((event, input))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    async fn run_waiting(
        node: Arc<EventWaitNode>,
        rt: RunContext,
        input: Value,
    ) -> Result<Value, WorkflowError> {
        node.execute(input, &rt).await
    }

    async fn wait_until_subscribed(rt: &RunContext) {
        while rt.bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_with_event_and_input() {
        let node = Arc::new(EventWaitNode::new("approved"));
        let rt = RunContext::for_tests();
        let task = tokio::spawn(run_waiting(node, rt.clone(), json!({"order": 7})));

        wait_until_subscribed(&rt).await;
        assert_eq!(*rt.status.borrow(), WorkflowStatus::Waiting);

        rt.bus.emit("approved", json!({"by": "ops"}));
        let output = task.await.unwrap().unwrap();

        let (event, input): (WorkflowEvent, Value) = serde_json::from_value(output).unwrap();
        assert_eq!(event.name, "approved");
        assert_eq!(event.data, json!({"by": "ops"}));
        assert_eq!(input, json!({"order": 7}));
        assert_eq!(*rt.status.borrow(), WorkflowStatus::Running);
        assert_eq!(rt.bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_other_event_names() {
        let node = Arc::new(EventWaitNode::new("approved"));
        let rt = RunContext::for_tests();
        let task = tokio::spawn(run_waiting(node, rt.clone(), Value::Null));

        wait_until_subscribed(&rt).await;
        rt.bus.emit("rejected", Value::Null);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());

        rt.bus.emit("approved", Value::Null);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_without_bound_by_default() {
        let node = Arc::new(EventWaitNode::new("later"));
        let rt = RunContext::for_tests();
        let task = tokio::spawn(run_waiting(node, rt.clone(), Value::Null));

        wait_until_subscribed(&rt).await;
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        assert!(!task.is_finished());
        assert!(!rt.source().is_cancelled());

        rt.bus.emit("later", Value::Null);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_the_wait() {
        let node = Arc::new(EventWaitNode::new("never"));
        let rt = RunContext::for_tests();
        let task = tokio::spawn(run_waiting(node, rt.clone(), Value::Null));

        wait_until_subscribed(&rt).await;
        rt.source().cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err, WorkflowError::Cancelled);
        assert_eq!(rt.bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_bound_times_out() {
        let mut node = EventWaitNode::new("never");
        node.timeout = Some(Duration::from_millis(250));
        let rt = RunContext::for_tests();

        let err = node.execute(Value::Null, &rt).await.unwrap_err();
        assert_eq!(err, WorkflowError::TimedOut { ms: 250 });
        assert!(rt.source().is_cancelled());
        assert_eq!(rt.bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_default_bound_applies() {
        let node = EventWaitNode::new("never");
        let mut rt = RunContext::for_tests();
        rt.event_wait_timeout = Some(Duration::from_millis(100));

        let err = node.execute(Value::Null, &rt).await.unwrap_err();
        assert_eq!(err, WorkflowError::TimedOut { ms: 100 });
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_is_at_most_once() {
        let node = Arc::new(EventWaitNode::new("tick"));
        let rt = RunContext::for_tests();
        let task = tokio::spawn(run_waiting(node, rt.clone(), Value::Null));

        wait_until_subscribed(&rt).await;
        assert_eq!(rt.bus.emit("tick", json!(1)), 1);
        let output = task.await.unwrap().unwrap();
        assert_eq!(output[0]["data"], json!(1));
        assert_eq!(rt.bus.emit("tick", json!(2)), 0);
    }
}
