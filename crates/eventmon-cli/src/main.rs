//! Eventmon CLI - credential issuance history.
//!
//! `eventmon run` records issuance notifications read from stdin into the
//! history file; `eventmon show` prints what has been recorded.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod theme;

use commands::{run, show};

/// Eventmon - credential issuance history recorder
#[derive(Parser)]
#[command(name = "eventmon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "EVENTMON_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the recorded issuance history
    Show {
        /// History file to read (defaults to the configured one)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Show one user's records instead of the summary
        #[arg(short, long)]
        user: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Record issuance notifications read from stdin (one JSON object per line)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = eventmon_config::Config::load(cli.config.as_deref())
        .context("loading configuration")?;

    let mut log_config = config_bridge::to_log_config(&config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = eventmon_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Show { file, user, json } => {
            show::run_show(&config, file.as_deref(), user.as_deref(), json)?;
        },
        Commands::Run => {
            run::run_recorder(&config).await?;
        },
    }

    Ok(())
}
