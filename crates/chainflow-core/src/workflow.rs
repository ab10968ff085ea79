//! The workflow orchestrator.
//!
//! A `Workflow` owns an immutable chain, the shared execution context, the
//! event bus its event waits listen on, and a status channel. `run()` drives
//! the chain against one input under an optional whole-workflow deadline:
//! 1. Default the cancellation source and bind it to the context
//! 2. Read the deadline from the terminal node (or the engine config)
//! 3. Spawn the chain and race it against the deadline
//! 4. Settle the status once and decode the result
//!
//! Dropping the `run()` future before it settles cancels the run's source and
//! marks the workflow `Faulted`, so the detached chain stops at its next
//! boundary and releases any event subscription.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chainflow_types::config::EngineConfig;
use chainflow_types::error::WorkflowError;
use chainflow_types::workflow::WorkflowStatus;
use futures_util::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cancellation::CancellationSource;
use crate::chain::ChainNode;
use crate::chain::node::RunContext;
use crate::context::ExecutionContext;
use crate::event::EventBus;

/// A built workflow taking `I` and producing `R`.
pub struct Workflow<I, R> {
    id: Uuid,
    name: String,
    head: Arc<ChainNode>,
    context: ExecutionContext,
    bus: EventBus,
    status: Arc<watch::Sender<WorkflowStatus>>,
    config: EngineConfig,
    _types: PhantomData<fn(I) -> R>,
}

impl<I, R> Workflow<I, R> {
    pub(crate) fn new(
        name: String,
        config: EngineConfig,
        bus: EventBus,
        context: ExecutionContext,
        head: Arc<ChainNode>,
    ) -> Self {
        let (status, _) = watch::channel(WorkflowStatus::Pending);
        Self {
            id: Uuid::now_v7(),
            name,
            head,
            context,
            bus,
            status: Arc::new(status),
            config,
            _types: PhantomData,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> WorkflowStatus {
        *self.status.borrow()
    }

    /// Watch status transitions, including `Waiting` while an event wait is
    /// suspended.
    pub fn subscribe_status(&self) -> watch::Receiver<WorkflowStatus> {
        self.status.subscribe()
    }

    /// The bus this workflow's event waits subscribe on.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// The data bag shared by every run of this workflow.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn chain(&self) -> &ChainNode {
        &self.head
    }

    /// Effective whole-workflow deadline.
    pub fn expiration(&self) -> Option<Duration> {
        self.head
            .terminal()
            .and_then(|terminal| terminal.expiration())
            .or_else(|| {
                self.config
                    .default_expiration_ms
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
            })
    }
}

impl<I, R> Workflow<I, R>
where
    I: Serialize,
    R: DeserializeOwned,
{
    /// Run the chain against `input`.
    ///
    /// Without a `source` the run gets its own. Either way the source is
    /// recorded in the workflow's context, and cancelling it stops the run at
    /// the next node boundary.
    pub async fn run(
        &self,
        input: I,
        source: Option<CancellationSource>,
    ) -> Result<R, WorkflowError> {
        let source = source.unwrap_or_default();
        let run_id = Uuid::now_v7();
        let rt = RunContext {
            ctx: self.context.for_run(source.clone()),
            source: source.clone(),
            bus: self.bus.clone(),
            status: Arc::clone(&self.status),
            event_wait_timeout: self
                .config
                .event_wait_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };

        self.status.send_replace(WorkflowStatus::Running);
        let guard = AbandonGuard {
            source,
            status: Arc::clone(&self.status),
            run_id,
            armed: true,
        };
        let expiration = self.expiration();
        tracing::info!(
            workflow = self.name.as_str(),
            %run_id,
            nodes = self.head.node_count(),
            expiration_ms = expiration.map(|d| d.as_millis() as u64),
            "workflow run started"
        );
        let started = tokio::time::Instant::now();

        let result = match serde_json::to_value(input) {
            Ok(payload) => self.drive(payload, &rt, expiration).await,
            Err(err) => Err(err.into()),
        };
        let result = result.and_then(|output| Ok(serde_json::from_value::<R>(output)?));

        let status = match &result {
            Ok(_) => WorkflowStatus::Completed,
            Err(WorkflowError::Stopped) => WorkflowStatus::Stopped,
            Err(_) => WorkflowStatus::Faulted,
        };
        self.status.send_replace(status);
        guard.disarm();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(
                workflow = self.name.as_str(),
                %run_id,
                %status,
                elapsed_ms,
                "workflow run finished"
            ),
            Err(err) => tracing::warn!(
                workflow = self.name.as_str(),
                %run_id,
                %status,
                elapsed_ms,
                error = %err,
                "workflow run failed"
            ),
        }
        result
    }

    async fn drive(
        &self,
        payload: Value,
        rt: &RunContext,
        expiration: Option<Duration>,
    ) -> Result<Value, WorkflowError> {
        let head = Arc::clone(&self.head);
        let chain_rt = rt.clone();
        let chain = tokio::spawn(async move { head.run(payload, &chain_rt).await }).map(|joined| {
            joined.unwrap_or_else(|e| {
                Err(WorkflowError::Internal(format!("workflow task failed: {e}")))
            })
        });

        let Some(limit) = expiration else {
            return chain.await;
        };

        tokio::select! {
            biased;
            result = chain => result,
            () = tokio::time::sleep(limit) => {
                rt.source().cancel();
                tracing::warn!(
                    workflow = self.name.as_str(),
                    expiration_ms = limit.as_millis() as u64,
                    "workflow expired, cancelling run"
                );
                Err(WorkflowError::expired(limit))
            }
        }
    }
}

/// Cancels a run whose future is dropped before it settles.
struct AbandonGuard {
    source: CancellationSource,
    status: Arc<watch::Sender<WorkflowStatus>>,
    run_id: Uuid,
    armed: bool,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.source.cancel();
        self.status.send_replace(WorkflowStatus::Faulted);
        tracing::warn!(
            run_id = %self.run_id,
            "workflow run dropped before settling, cancelling run"
        );
    }
}

impl<I, R> std::fmt::Debug for Workflow<I, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.head.node_count())
            .field("status", &self.status())
            .finish()
    }
}
