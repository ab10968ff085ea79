//! The executable chain: a singly linked list of tagged node variants.
//!
//! Every node consumes and produces a JSON payload, runs its own unit of work,
//! then hands the output to `next`. The chain is assembled once by the builder
//! and never mutated while running.

use std::sync::Arc;
use std::time::Duration;

use chainflow_types::error::WorkflowError;
use chainflow_types::workflow::{Fault, WorkflowStatus};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

use crate::cancellation::CancellationSource;
use crate::context::ExecutionContext;
use crate::event::EventBus;
use crate::step::{SharedStep, spawn_step};

use super::conditional::ConditionalNode;
use super::event_wait::EventWaitNode;
use super::parallel::ParallelNode;
use super::sequential::SequentialNode;
use super::terminal::TerminalNode;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Per-node delay before the work starts and timeout over delay plus work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub delay: Option<Duration>,
    pub timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Everything a node needs from the run it belongs to.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) ctx: ExecutionContext,
    pub(crate) source: CancellationSource,
    pub(crate) bus: EventBus,
    pub(crate) status: Arc<watch::Sender<WorkflowStatus>>,
    /// Default bound for event waits that set none themselves.
    pub(crate) event_wait_timeout: Option<Duration>,
}

impl RunContext {
    pub(crate) fn source(&self) -> &CancellationSource {
        &self.source
    }

    /// Nodes never overwrite a settled run.
    pub(crate) fn set_status(&self, status: WorkflowStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let (status, _) = watch::channel(WorkflowStatus::Running);
        let source = CancellationSource::new();
        Self {
            ctx: ExecutionContext::new().for_run(source.clone()),
            source,
            bus: EventBus::new(),
            status: Arc::new(status),
            event_wait_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ChainNode
// ---------------------------------------------------------------------------

/// The closed set of node variants.
pub enum NodeKind {
    Sequential(SequentialNode),
    Conditional(ConditionalNode),
    Parallel(ParallelNode),
    EventWait(EventWaitNode),
    Terminal(TerminalNode),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Sequential(_) => "sequential",
            NodeKind::Conditional(_) => "conditional",
            NodeKind::Parallel(_) => "parallel",
            NodeKind::EventWait(_) => "event_wait",
            NodeKind::Terminal(_) => "terminal",
        }
    }
}

/// One link of the chain. Owns the remainder of the chain through `next`.
pub struct ChainNode {
    kind: NodeKind,
    next: Option<Box<ChainNode>>,
}

impl ChainNode {
    pub(crate) fn new(kind: NodeKind, next: Option<Box<ChainNode>>) -> Self {
        Self { kind, next }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn next(&self) -> Option<&ChainNode> {
        self.next.as_deref()
    }

    /// This node followed by every node after it.
    pub fn iter(&self) -> impl Iterator<Item = &ChainNode> {
        std::iter::successors(Some(self), |node| node.next())
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// The chain's terminal node, if it has one.
    pub fn terminal(&self) -> Option<&TerminalNode> {
        self.iter().find_map(|node| match &node.kind {
            NodeKind::Terminal(terminal) => Some(terminal),
            _ => None,
        })
    }

    /// Run this node, then recurse into `next` with its output.
    pub(crate) fn run<'a>(
        &'a self,
        input: Value,
        rt: &'a RunContext,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            if rt.source().is_cancelled() {
                tracing::debug!(node = self.kind.label(), "run cancelled before node");
                return Err(WorkflowError::Cancelled);
            }

            tracing::debug!(node = self.kind.label(), "entering node");
            let output = match &self.kind {
                NodeKind::Sequential(node) => node.execute(input, rt).await?,
                NodeKind::Conditional(node) => node.execute(input, rt).await?,
                NodeKind::Parallel(node) => node.execute(input, rt).await?,
                NodeKind::EventWait(node) => node.execute(input, rt).await?,
                NodeKind::Terminal(node) => node.execute(input, rt).await?,
            };

            match &self.next {
                Some(next) => next.run(output, rt).await,
                None => Ok(output),
            }
        })
    }
}

/// Hand a captured step failure to a recovery step.
pub(crate) async fn run_with_fault(
    step: &SharedStep,
    err: &WorkflowError,
    rt: &RunContext,
) -> Result<Value, WorkflowError> {
    let fault = serde_json::to_value(Fault::new(err))?;
    spawn_step(step.clone(), fault, rt.ctx.clone()).await
}
