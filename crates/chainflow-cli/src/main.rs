//! chainflow CLI entry point.
//!
//! Binary name: `chainflow`
//!
//! Loads the engine configuration, initializes tracing, then dispatches to
//! the requested command.

mod cli;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = chainflow_core::config::load_engine_config(&cli.config).await;

    // -v / -vv override the configured filter; RUST_LOG still wins.
    match cli.verbose {
        0 => {}
        1 => config.log.filter = "info,chainflow_core=debug".to_string(),
        _ => config.log.filter = "trace".to_string(),
    }
    chainflow_observe::init_tracing(&config.log)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let outcome = match cli.command {
        Commands::Run { scenario, input } => {
            cli::run::handle_run(scenario, input, config, cli.json).await
        }
        Commands::Config => cli::config::show_config(&config, &cli.config, cli.json),
    };

    chainflow_observe::shutdown_tracing();
    outcome
}
