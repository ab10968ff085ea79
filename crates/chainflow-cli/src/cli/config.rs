//! `chainflow config`: print the effective engine configuration.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use chainflow_types::config::EngineConfig;

pub fn show_config(config: &EngineConfig, path: &Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    let rendered = toml::to_string_pretty(config).context("failed to render config as TOML")?;
    println!();
    println!(
        "  {} Engine configuration ({})",
        style("⚙").bold(),
        style(path.display()).dim()
    );
    println!();
    for line in rendered.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}
