//! oraguard unified CLI.
//!
//! A read-only SQL safety gateway between an LLM-driven agent and an
//! Oracle database reached through a local proxy.
//!
//! # Quick Start
//!
//! ```bash
//! # Credentials stay in the environment, never on a command line
//! export ORACLE_SERVICE_NAME=orclpdb ORACLE_USER=scott ORACLE_PASSWORD=...
//!
//! # Serve the tool interface over stdio
//! oraguard serve
//!
//! # One-shot health probe
//! oraguard health
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// oraguard - the read-only Oracle safety gateway.
#[derive(Parser)]
#[command(name = "oraguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Serve the agent tool interface over stdio.
    Serve {
        /// Directory containing oraguard.toml.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,
    },

    /// Start the executors, probe them, report health, and exit.
    Health {
        /// Directory containing oraguard.toml.
        #[arg(long, default_value = ".")]
        config_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    // Audit lines go to stderr; stdout belongs to the tool protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("oraguard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Serve { config_dir } => commands::serve::run(&config_dir),
        Commands::Health { config_dir } => commands::health::run(&config_dir),
    }
}
