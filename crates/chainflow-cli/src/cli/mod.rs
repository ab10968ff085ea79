//! CLI command definitions for the `chainflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;
pub mod demos;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Run the bundled chainflow demo workflows.
#[derive(Parser)]
#[command(name = "chainflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the engine configuration file.
    #[arg(long, global = true, env = "CHAINFLOW_CONFIG", default_value = "engine.toml")]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one of the bundled demo workflows.
    Run {
        /// Which demo to run.
        #[arg(value_enum)]
        scenario: Scenario,

        /// Input value for demos that take a number.
        #[arg(long)]
        input: Option<u32>,
    },

    /// Print the effective engine configuration.
    Config,
}

/// Bundled demo workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Branch on an age: Highschool, College, Retirement or unknown.
    Age,
    /// Fan a value out to two steps and join in declaration order.
    Parallel,
    /// A slow step trips the workflow deadline.
    Expire,
    /// A branch aborts the run manually.
    Stop,
    /// A failing step is compensated with a fault-capturing step.
    Fault,
    /// Suspend until an external event is emitted.
    Event,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Age => "age",
            Scenario::Parallel => "parallel",
            Scenario::Expire => "expire",
            Scenario::Stop => "stop",
            Scenario::Fault => "fault",
            Scenario::Event => "event",
        }
    }
}
