//! CLI for the upq upload queue worker.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upq_core::config;

use commands::{run_enqueue, run_retry_failed, run_status, run_worker};

/// Top-level CLI for the upq upload queue worker.
#[derive(Debug, Parser)]
#[command(name = "upq")]
#[command(about = "upq: queue-driven resumable uploader", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/upq/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Drain the work queue until SIGINT/SIGTERM.
    Run,

    /// Push paths onto the work queue.
    Enqueue {
        /// Files or directories to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show queue lengths and in-flight upload sessions.
    Status,

    /// Move every job on the failure queue back to the work queue.
    RetryFailed,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = match &cli.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run => run_worker(&cfg).await?,
            CliCommand::Enqueue { paths } => run_enqueue(&cfg, &paths).await?,
            CliCommand::Status => run_status(&cfg).await?,
            CliCommand::RetryFailed => run_retry_failed(&cfg).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
