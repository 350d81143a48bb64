//! Plan and apply command implementations

use std::sync::Arc;

use colored::Colorize;
use settings_core::{Reconciler, RunMode};

use crate::context::Workspace;
use crate::error::Result;

/// Reconcile `repos` and print the report.
///
/// Returns whether the run was free of errors. In live mode the updated
/// state is written back to the snapshot file.
pub async fn run_sync(workspace: &Workspace, repos: &[String], mode: RunMode, json: bool) -> Result<bool> {
    let resolver = workspace.resolver().await?;
    let reconciler = Reconciler::new(Arc::new(resolver), workspace.adapters(), mode);

    let targets = workspace.targets(repos).await;
    if !json {
        let verb = if mode.is_dry_run() { "Planning" } else { "Applying" };
        println!(
            "{} {} changes for {} repositories ({})",
            "=>".blue().bold(),
            verb,
            targets.len(),
            mode
        );
    }

    let report = reconciler.run(targets).await;

    if !mode.is_dry_run() {
        workspace.save_state().await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
        if report.is_failure() {
            println!("{} Run finished with errors.", "FAILED".red().bold());
        } else {
            println!("{} Run finished.", "OK".green().bold());
        }
    }

    Ok(!report.is_failure())
}
