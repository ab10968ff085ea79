//! `chainflow run`: execute a bundled demo and report the outcome.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use chainflow_core::Workflow;
use chainflow_types::config::EngineConfig;
use chainflow_types::error::WorkflowError;
use chainflow_types::workflow::WorkflowStatus;

use super::Scenario;
use super::demos;

/// How long the `event` demo waits before emitting its approval.
const APPROVAL_DELAY: Duration = Duration::from_millis(200);

/// Result of one demo run, ready for display.
struct Outcome {
    workflow: String,
    status: WorkflowStatus,
    result: Result<Value, WorkflowError>,
    elapsed: Duration,
}

async fn execute<I, R>(workflow: &Workflow<I, R>, input: I) -> Outcome
where
    I: Serialize,
    R: DeserializeOwned + Serialize,
{
    let started = Instant::now();
    let result = workflow
        .run(input, None)
        .await
        .and_then(|output| Ok(serde_json::to_value(output)?));
    Outcome {
        workflow: workflow.name().to_string(),
        status: workflow.status(),
        result,
        elapsed: started.elapsed(),
    }
}

/// Run `scenario` and print its outcome. A failed run is reported, not
/// returned as an error: failing is what several demos are for.
pub async fn handle_run(
    scenario: Scenario,
    input: Option<u32>,
    config: EngineConfig,
    json: bool,
) -> Result<()> {
    let context = || format!("failed to build the '{}' demo", scenario.name());

    let outcome = match scenario {
        Scenario::Age => {
            let workflow = demos::age(config).with_context(context)?;
            execute(&workflow, input.unwrap_or(18)).await
        }
        Scenario::Parallel => {
            let workflow = demos::parallel(config).with_context(context)?;
            execute(&workflow, ()).await
        }
        Scenario::Expire => {
            let workflow = demos::expire(config).with_context(context)?;
            execute(&workflow, input.unwrap_or(1)).await
        }
        Scenario::Stop => {
            let workflow = demos::stop(config).with_context(context)?;
            execute(&workflow, input.unwrap_or(99)).await
        }
        Scenario::Fault => {
            let workflow = demos::fault(config).with_context(context)?;
            execute(&workflow, ()).await
        }
        Scenario::Event => {
            let workflow = demos::event(config).with_context(context)?;
            let bus = workflow.event_bus().clone();
            tokio::spawn(async move {
                tokio::time::sleep(APPROVAL_DELAY).await;
                let delivered = bus.emit(demos::APPROVAL_EVENT, json!({"by": "chainflow-cli"}));
                tracing::debug!(delivered, "approval emitted");
            });
            execute(&workflow, input.unwrap_or(7)).await
        }
    };

    render(&outcome, json)
}

fn render(outcome: &Outcome, json: bool) -> Result<()> {
    let elapsed_ms = outcome.elapsed.as_millis() as u64;

    if json {
        let report = match &outcome.result {
            Ok(output) => json!({
                "workflow": outcome.workflow,
                "status": outcome.status,
                "elapsed_ms": elapsed_ms,
                "output": output,
            }),
            Err(err) => json!({
                "workflow": outcome.workflow,
                "status": outcome.status,
                "elapsed_ms": elapsed_ms,
                "error": err.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let status = match outcome.status {
        WorkflowStatus::Completed => style(outcome.status.to_string()).green(),
        WorkflowStatus::Stopped => style(outcome.status.to_string()).yellow(),
        _ => style(outcome.status.to_string()).red(),
    };

    println!();
    println!(
        "  {} Workflow '{}' {} in {elapsed_ms} ms",
        style("▶").bold(),
        style(&outcome.workflow).cyan(),
        status
    );
    match &outcome.result {
        Ok(output) => println!("  {} {output}", style("Output:").dim()),
        Err(err) => println!("  {} {err}", style("Error:").dim()),
    }
    println!();
    Ok(())
}
