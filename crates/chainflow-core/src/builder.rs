//! Typed, fluent assembly of a workflow chain.
//!
//! The builder is the only place where payload types are tracked at compile
//! time: `ChainBuilder<I, O>` knows the workflow input `I` and the output `O`
//! of the last node added, so each new step must accept `O`. Nodes are
//! collected in a `Vec` and linked back to front by `build()`; the index of the
//! last entry is the assembly-time "previous" pointer.
//!
//! Structural mistakes that types cannot catch (an empty fan-out, a branch with
//! neither a step nor `stop()`, a second `otherwise()`) are recorded when they
//! happen and reported once by `build()` as `WorkflowError::InvalidChain`.
//!
//! ```ignore
//! let workflow = WorkflowBuilder::new("ages")
//!     .start_with(ReadAge)
//!     .when(|age: &u32| *age == 18).execute(Highschool)
//!     .or_when(|age: &u32| *age == 22).execute(College)
//!     .otherwise().execute(UnknownAge)
//!     .end_if()
//!     .end_with(Announce)
//!     .expire(5_000)
//!     .build()?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chainflow_types::config::EngineConfig;
use chainflow_types::error::WorkflowError;
use chainflow_types::event::WorkflowEvent;
use chainflow_types::workflow::Fault;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::chain::{
    Branch, ChainNode, ConditionalNode, EventWaitNode, NodeKind, ParallelNode, Predicate,
    SequentialNode, TerminalNode, Timing,
};
use crate::context::ExecutionContext;
use crate::event::EventBus;
use crate::retry::RetryPolicy;
use crate::step::{SharedStep, Step, share};
use crate::workflow::Workflow;

/// Zero means "unset".
fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Everything except the chain itself.
struct Parts {
    name: String,
    config: EngineConfig,
    bus: EventBus,
    context: ExecutionContext,
}

// ---------------------------------------------------------------------------
// WorkflowBuilder
// ---------------------------------------------------------------------------

/// Entry point: workflow-wide settings, then `start_with` the first step.
pub struct WorkflowBuilder {
    parts: Parts,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            parts: Parts {
                name: name.into(),
                config: EngineConfig::default(),
                bus: EventBus::new(),
                context: ExecutionContext::new(),
            },
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.parts.config = config;
        self
    }

    /// Share a bus with the caller so it can emit the events this workflow
    /// waits for.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.parts.bus = bus;
        self
    }

    /// Seed the execution context's data bag.
    pub fn with_data<K, D>(mut self, entries: D) -> Self
    where
        K: Into<String>,
        D: IntoIterator<Item = (K, Value)>,
    {
        self.parts.context = ExecutionContext::with_data(entries);
        self
    }

    pub fn start_with<S: Step>(self, step: S) -> ChainBuilder<S::Input, S::Output> {
        ChainBuilder {
            parts: self.parts,
            nodes: vec![NodeKind::Sequential(SequentialNode::new(
                share(step),
                Timing::default(),
            ))],
            error: None,
            _types: PhantomData,
        }
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new("workflow")
    }
}

// ---------------------------------------------------------------------------
// ChainBuilder
// ---------------------------------------------------------------------------

/// A chain under construction whose last node outputs `O`.
pub struct ChainBuilder<I, O> {
    parts: Parts,
    nodes: Vec<NodeKind>,
    error: Option<WorkflowError>,
    _types: PhantomData<fn(I) -> O>,
}

fn timing_of(node: Option<&mut NodeKind>) -> Result<&mut Timing, String> {
    match node {
        Some(NodeKind::Sequential(node)) => Ok(&mut node.timing),
        Some(NodeKind::Parallel(node)) => Ok(&mut node.timing),
        Some(NodeKind::Terminal(node)) => Ok(&mut node.timing),
        Some(NodeKind::Conditional(_)) => {
            Err("delay/timeout after end_if() is ambiguous; set them per branch".to_string())
        }
        Some(NodeKind::EventWait(_)) => Err("an event wait accepts timeout() only".to_string()),
        None => Err("delay/timeout before any node".to_string()),
    }
}

fn sequential_of(node: Option<&mut NodeKind>) -> Result<&mut SequentialNode, String> {
    match node {
        Some(NodeKind::Sequential(node)) => Ok(node),
        Some(other) => Err(format!(
            "on_failure() applies to a plain step, not a {} node",
            other.label()
        )),
        None => Err("on_failure() before any node".to_string()),
    }
}

impl<I, O> ChainBuilder<I, O> {
    fn retype<P>(self) -> ChainBuilder<I, P> {
        ChainBuilder {
            parts: self.parts,
            nodes: self.nodes,
            error: self.error,
            _types: PhantomData,
        }
    }

    /// Keep the first structural error; later ones are usually consequences.
    fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(WorkflowError::InvalidChain(message.into()));
        }
    }

    /// Run `step` with the previous output.
    pub fn then<S: Step<Input = O>>(mut self, step: S) -> ChainBuilder<I, S::Output> {
        self.nodes.push(NodeKind::Sequential(SequentialNode::new(
            share(step),
            Timing::default(),
        )));
        self.retype()
    }

    /// Wait `ms` before the last node's work starts.
    pub fn delay(mut self, ms: u64) -> Self {
        match timing_of(self.nodes.last_mut()) {
            Ok(timing) => timing.delay = millis(ms),
            Err(message) => self.fail(message),
        }
        self
    }

    /// Bound the last node's delay plus work by `ms`. On an event wait this
    /// bounds the wait instead. Zero leaves the node unbounded.
    pub fn timeout(mut self, ms: u64) -> Self {
        if let Some(NodeKind::EventWait(node)) = self.nodes.last_mut() {
            node.timeout = millis(ms);
            return self;
        }
        match timing_of(self.nodes.last_mut()) {
            Ok(timing) => timing.timeout = millis(ms),
            Err(message) => self.fail(message),
        }
        self
    }

    /// Configure what happens when the last step fails.
    pub fn on_failure(self) -> FailureBuilder<I, O> {
        FailureBuilder { chain: self }
    }

    /// Open a conditional block whose first branch runs when `predicate`
    /// holds for the previous output.
    pub fn when<N, P>(self, predicate: P) -> IfBuilder<I, O, N>
    where
        O: DeserializeOwned + 'static,
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        IfBuilder {
            chain: self,
            branches: vec![Branch::new(Some(typed_predicate(predicate)))],
            _output: PhantomData,
        }
    }

    /// Run every step of `fan_out` concurrently on the previous output and
    /// collect their outputs in declaration order.
    pub fn parallel<T>(mut self, fan_out: FanOut<O, T>) -> ChainBuilder<I, Vec<T>> {
        if fan_out.steps.is_empty() {
            self.fail("parallel() needs at least one step");
        }
        self.nodes.push(NodeKind::Parallel(ParallelNode {
            steps: fan_out.steps,
            timing: Timing::default(),
        }));
        self.retype()
    }

    /// Suspend until `event_name` is emitted on the workflow's bus. The next
    /// step receives `(event, previous output)`.
    pub fn wait(mut self, event_name: impl Into<String>) -> ChainBuilder<I, (WorkflowEvent, O)> {
        let event_name = event_name.into();
        if event_name.is_empty() {
            self.fail("wait() needs an event name");
        }
        self.nodes.push(NodeKind::EventWait(EventWaitNode::new(event_name)));
        self.retype()
    }

    /// Close the chain with its terminal step.
    pub fn end_with<S: Step<Input = O>>(mut self, step: S) -> TerminalBuilder<I, S::Output> {
        self.nodes.push(NodeKind::Terminal(TerminalNode::new(
            share(step),
            Timing::default(),
        )));
        TerminalBuilder {
            chain: self.retype(),
        }
    }
}

fn typed_predicate<O, P>(predicate: P) -> Predicate
where
    O: DeserializeOwned + 'static,
    P: Fn(&O) -> bool + Send + Sync + 'static,
{
    Arc::new(move |value: &Value| -> Result<bool, WorkflowError> {
        let input = O::deserialize(value)?;
        Ok(predicate(&input))
    })
}

// ---------------------------------------------------------------------------
// FailureBuilder
// ---------------------------------------------------------------------------

/// Failure handling for the last plain step.
pub struct FailureBuilder<I, O> {
    chain: ChainBuilder<I, O>,
}

impl<I, O> FailureBuilder<I, O> {
    fn apply(mut self, f: impl FnOnce(&mut SequentialNode)) -> ChainBuilder<I, O> {
        match sequential_of(self.chain.nodes.last_mut()) {
            Ok(node) => f(node),
            Err(message) => self.chain.fail(message),
        }
        self.chain
    }

    /// Absorb the failure: `step` receives a `Fault` and its output becomes
    /// this node's output.
    pub fn continue_with<S>(self, step: S) -> ChainBuilder<I, O>
    where
        S: Step<Input = Fault, Output = O>,
    {
        let step = share(step);
        self.apply(move |node| node.compensation = Some(step))
    }

    /// Re-run the step every `ms` until it succeeds or the run is cancelled.
    pub fn retry_every(self, ms: u64) -> ChainBuilder<I, O> {
        self.retry(RetryPolicy::every(Duration::from_millis(ms)))
    }

    pub fn retry(self, policy: RetryPolicy) -> ChainBuilder<I, O> {
        self.apply(move |node| node.retry = Some(policy))
    }

    /// Propagate the failure. This is the default.
    pub fn terminate(self) -> ChainBuilder<I, O> {
        self.apply(|node| {
            node.retry = None;
            node.compensation = None;
        })
    }
}

// ---------------------------------------------------------------------------
// IfBuilder
// ---------------------------------------------------------------------------

/// An open conditional block. `N` is the output every executing branch must
/// produce.
pub struct IfBuilder<I, O, N> {
    chain: ChainBuilder<I, O>,
    branches: Vec<Branch>,
    _output: PhantomData<fn() -> N>,
}

impl<I, O, N> IfBuilder<I, O, N>
where
    O: DeserializeOwned + 'static,
{
    fn current(&mut self) -> &mut Branch {
        let last = self.branches.len() - 1;
        &mut self.branches[last]
    }

    fn push_branch(&mut self, predicate: Option<Predicate>) {
        if self.branches.last().is_some_and(Branch::is_otherwise) {
            let message = if predicate.is_some() {
                "or_when() after otherwise()"
            } else {
                "otherwise() may appear only once"
            };
            self.chain.fail(message);
        }
        self.branches.push(Branch::new(predicate));
    }

    /// Step run when the current branch is selected.
    pub fn execute<S: Step<Input = O, Output = N>>(mut self, step: S) -> Self {
        let branch = self.current();
        let problem = if branch.stop {
            Some("a branch cannot both stop() and execute() a step")
        } else if branch.step.is_some() {
            Some("a branch takes a single execute()")
        } else {
            branch.step = Some(share(step));
            None
        };
        if let Some(message) = problem {
            self.chain.fail(message);
        }
        self
    }

    /// Abort the whole run with `Stopped` when the current branch is selected.
    pub fn stop(mut self) -> Self {
        let branch = self.current();
        if branch.step.is_some() {
            self.chain.fail("a branch cannot both stop() and execute() a step");
        } else {
            branch.stop = true;
        }
        self
    }

    pub fn delay(mut self, ms: u64) -> Self {
        self.current().timing.delay = millis(ms);
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.current().timing.timeout = millis(ms);
        self
    }

    pub fn or_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.push_branch(Some(typed_predicate(predicate)));
        self
    }

    /// Catch-all branch; must be the last one.
    pub fn otherwise(mut self) -> Self {
        self.push_branch(None);
        self
    }

    pub fn end_if(mut self) -> ChainBuilder<I, N> {
        if let Some(index) = self
            .branches
            .iter()
            .position(|branch| branch.step.is_none() && !branch.stop)
        {
            self.chain.fail(format!("branch {index} has neither execute() nor stop()"));
        }
        self.chain.nodes.push(NodeKind::Conditional(ConditionalNode {
            branches: self.branches,
        }));
        self.chain.retype()
    }
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// Ordered set of steps for `parallel()`, all taking `I` and producing `T`.
pub struct FanOut<I, T> {
    steps: Vec<SharedStep>,
    _types: PhantomData<fn(I) -> T>,
}

impl<I, T> FanOut<I, T> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            _types: PhantomData,
        }
    }

    pub fn step<S: Step<Input = I, Output = T>>(mut self, step: S) -> Self {
        self.steps.push(share(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<I, T> Default for FanOut<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TerminalBuilder
// ---------------------------------------------------------------------------

/// The closed chain; only terminal settings and `build()` remain.
pub struct TerminalBuilder<I, R> {
    chain: ChainBuilder<I, R>,
}

impl<I, R> TerminalBuilder<I, R> {
    fn terminal(&mut self) -> Option<&mut TerminalNode> {
        match self.chain.nodes.last_mut() {
            Some(NodeKind::Terminal(node)) => Some(node),
            _ => None,
        }
    }

    pub fn delay(self, ms: u64) -> Self {
        Self {
            chain: self.chain.delay(ms),
        }
    }

    pub fn timeout(self, ms: u64) -> Self {
        Self {
            chain: self.chain.timeout(ms),
        }
    }

    /// Fail the whole run with `Expired` if it has not settled within `ms`.
    pub fn expire(mut self, ms: u64) -> Self {
        if ms == 0 {
            self.chain.fail("expire() needs a positive duration");
            return self;
        }
        if let Some(node) = self.terminal() {
            node.expiration = Some(Duration::from_millis(ms));
        }
        self
    }

    /// Notify `step` with a `Fault` if the terminal step fails. The run still
    /// fails with the original error.
    pub fn failed<S: Step<Input = Fault>>(mut self, step: S) -> Self {
        let step = share(step);
        if let Some(node) = self.terminal() {
            node.failure_step = Some(step);
        }
        self
    }

    /// Link the collected nodes into an immutable chain.
    pub fn build(self) -> Result<Workflow<I, R>, WorkflowError> {
        let ChainBuilder {
            parts,
            nodes,
            error,
            ..
        } = self.chain;
        if let Some(err) = error {
            return Err(err);
        }

        let head = nodes
            .into_iter()
            .rev()
            .fold(None, |next, kind| Some(Box::new(ChainNode::new(kind, next))))
            .ok_or_else(|| WorkflowError::InvalidChain("empty chain".to_string()))?;

        tracing::debug!(
            workflow = parts.name.as_str(),
            nodes = head.node_count(),
            "workflow built"
        );
        Ok(Workflow::new(
            parts.name,
            parts.config,
            parts.bus,
            parts.context,
            Arc::from(head),
        ))
    }
}
