//! The step contract and its type-erased form.
//!
//! User code implements [`Step`] with concrete input and output types. The
//! executing chain only ever sees [`StepDyn`], an object-safe version over
//! `serde_json::Value` payloads:
//! 1. `Step` uses RPITIT for `run`, so it is not dyn-compatible
//! 2. `StepDyn` boxes the future and converts payloads at the boundary
//! 3. A blanket impl makes every `Step` a `StepDyn`

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use chainflow_types::error::{StepError, WorkflowError};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;

/// A unit of work.
///
/// Steps should poll `token.is_cancelled()` to abandon work once the run has
/// been cancelled; the engine never aborts a step that is already running.
pub trait Step: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn run(
        &self,
        input: Self::Input,
        ctx: &ExecutionContext,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Output, StepError>> + Send;
}

/// Object-safe version of [`Step`] over JSON payloads.
pub trait StepDyn: Send + Sync {
    fn name(&self) -> &str;

    fn run_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a ExecutionContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>>;
}

impl<S: Step> StepDyn for S {
    fn name(&self) -> &str {
        Step::name(self)
    }

    fn run_boxed<'a>(
        &'a self,
        input: Value,
        ctx: &'a ExecutionContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        Box::pin(async move {
            let input: S::Input = serde_json::from_value(input)?;
            let output = self.run(input, ctx, token).await?;
            Ok(serde_json::to_value(output)?)
        })
    }
}

/// Shared handle to a type-erased step, as stored in chain nodes.
pub type SharedStep = Arc<dyn StepDyn>;

pub(crate) fn share<S: Step>(step: S) -> SharedStep {
    Arc::new(step)
}

/// Start a shared step on its own task and return a future for its result.
///
/// The task is spawned immediately. Dropping the returned future detaches the
/// task instead of aborting it, so a lost race leaves the step running to
/// completion with its result discarded.
pub(crate) fn spawn_step(
    step: SharedStep,
    input: Value,
    ctx: ExecutionContext,
) -> impl Future<Output = Result<Value, WorkflowError>> + Send + 'static {
    let handle = tokio::spawn(async move {
        let token = ctx.token();
        step.run_boxed(input, &ctx, &token).await
    });
    handle.map(|joined| {
        joined.unwrap_or_else(|e| Err(WorkflowError::Internal(format!("step task failed: {e}"))))
    })
}

// ---------------------------------------------------------------------------
// Closure steps
// ---------------------------------------------------------------------------

/// A step backed by an async closure. Built with [`step_fn`] or
/// [`named_step_fn`].
pub struct FnStep<F, I, O> {
    name: String,
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<F, Fut, I, O> Step for FnStep<F, I, O>
where
    F: Fn(I, ExecutionContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, StepError>> + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        &self,
        input: I,
        ctx: &ExecutionContext,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<O, StepError>> + Send {
        (self.f)(input, ctx.clone(), token.clone())
    }
}

/// Wrap an async closure `(input, ctx, token) -> Result<O, StepError>` as a step.
pub fn step_fn<F, Fut, I, O>(f: F) -> FnStep<F, I, O>
where
    F: Fn(I, ExecutionContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, StepError>> + Send + 'static,
{
    named_step_fn("closure", f)
}

pub fn named_step_fn<F, Fut, I, O>(name: impl Into<String>, f: F) -> FnStep<F, I, O>
where
    F: Fn(I, ExecutionContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, StepError>> + Send + 'static,
{
    FnStep {
        name: name.into(),
        f,
        _types: PhantomData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Double;

    impl Step for Double {
        type Input = u32;
        type Output = u32;

        async fn run(
            &self,
            input: u32,
            _ctx: &ExecutionContext,
            _token: &CancellationToken,
        ) -> Result<u32, StepError> {
            Ok(input * 2)
        }
    }

    #[tokio::test]
    async fn erased_step_converts_payloads() {
        let step: SharedStep = share(Double);
        let ctx = ExecutionContext::new();
        let token = ctx.token();

        let output = step.run_boxed(json!(21), &ctx, &token).await.unwrap();
        assert_eq!(output, json!(42));
        assert!(step.name().ends_with("Double"));
    }

    #[tokio::test]
    async fn erased_step_rejects_mismatched_input() {
        let step: SharedStep = share(Double);
        let ctx = ExecutionContext::new();
        let token = ctx.token();

        let result = step.run_boxed(json!("not a number"), &ctx, &token).await;
        assert!(matches!(result, Err(WorkflowError::Payload(_))));
    }

    #[tokio::test]
    async fn closure_step_sees_context_and_token() {
        let step = named_step_fn(
            "record",
            |input: String, ctx: ExecutionContext, token: CancellationToken| async move {
                if token.is_cancelled() {
                    return Err(StepError::Cancelled);
                }
                ctx.set("seen", &input).map_err(|e| StepError::failed(e.to_string()))?;
                Ok(format!("{input}!"))
            },
        );
        assert_eq!(Step::name(&step), "record");

        let ctx = ExecutionContext::new();
        let output = spawn_step(share(step), json!("hi"), ctx.clone()).await.unwrap();
        assert_eq!(output, json!("hi!"));
        assert_eq!(ctx.get::<String>("seen").unwrap().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn step_failure_maps_to_workflow_error() {
        let step = step_fn(|_: (), _ctx: ExecutionContext, _token: CancellationToken| async {
            Err::<u32, _>(StepError::failed("boom"))
        });
        let err = spawn_step(share(step), Value::Null, ExecutionContext::new())
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::Step(StepError::failed("boom")));
    }

    #[tokio::test]
    async fn panicking_step_becomes_internal_error() {
        let step = step_fn(|_: (), _ctx: ExecutionContext, _token: CancellationToken| async {
            if true {
                panic!("step blew up");
            }
            Ok::<u32, StepError>(0)
        });
        let err = spawn_step(share(step), Value::Null, ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Internal(_)));
    }
}
