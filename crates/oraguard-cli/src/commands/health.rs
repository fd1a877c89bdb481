//! Health command: start the executors, probe them, report, exit.

use std::path::Path;

use anyhow::{Context, Result};

/// Prints a JSON health report to stdout.
pub fn run(config_dir: &Path) -> Result<()> {
    let gateway = super::build_gateway(config_dir)?;
    let health = gateway.health();
    println!(
        "{}",
        serde_json::to_string_pretty(&health).context("failed to encode health report")?
    );
    gateway.shutdown();
    Ok(())
}
