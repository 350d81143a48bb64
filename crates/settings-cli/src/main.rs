//! Settings reconciler CLI
//!
//! Resolves layered repository settings from a configuration directory and
//! reconciles them against an observed-state snapshot.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use settings_core::RunMode;

use cli::{Cli, Commands};
use context::Workspace;
use error::Result;

/// Exit status of a run that reported errors
const EXIT_RUN_FAILED: u8 = 2;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: failed to initialize logging: {}", "warning".yellow(), e);
    }
    tracing::debug!(config = %cli.config.display(), "Starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute_command(cli))
}

async fn execute_command(cli: Cli) -> Result<ExitCode> {
    let workspace = Workspace::open(&cli.config, cli.deployment.as_deref(), cli.state.as_deref()).await?;

    match cli.command {
        Commands::Resolve { repo, json } => {
            commands::run_resolve(&workspace, &repo, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { repos, json } => {
            let ok = commands::run_sync(&workspace, &repos, RunMode::DryRun, json).await?;
            Ok(exit_for(ok))
        }
        Commands::Apply { repos, json } => {
            let ok = commands::run_sync(&workspace, &repos, RunMode::Live, json).await?;
            Ok(exit_for(ok))
        }
        Commands::CheckScope { repos } => {
            commands::run_check_scope(&workspace, &repos).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_for(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_RUN_FAILED)
    }
}
