//! CLI command implementations.

pub mod health;
pub mod serve;

use std::path::Path;

use anyhow::{Context, Result};

use oraguard_config::ConfigLoader;
use oraguard_gateway::Gateway;

/// Loads configuration and brings the gateway (and its executor pool)
/// up. Any failure here is fatal to the command.
fn build_gateway(config_dir: &Path) -> Result<Gateway> {
    let config = ConfigLoader::new()
        .with_project_dir(config_dir)
        .load()
        .context("failed to load configuration")?;
    Gateway::new(&config).context("failed to start gateway")
}
