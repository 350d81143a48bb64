//! Resolve command implementation

use colored::Colorize;
use settings_core::Resolution;

use crate::context::Workspace;
use crate::error::Result;

/// Print the effective configuration of `repo`.
pub async fn run_resolve(workspace: &Workspace, repo: &str, json: bool) -> Result<()> {
    let resolver = workspace.resolver().await?;

    let config = match resolver.resolve(repo).await? {
        Resolution::Resolved(config) => config,
        Resolution::Excluded => {
            println!("{} {} is out of scope", "SKIP".yellow().bold(), repo.cyan());
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match &config.group {
        Some(group) => println!("# {} (group: {})", repo, group),
        None => println!("# {}", repo),
    }
    print!("{}", serde_yaml::to_string(&config.tree)?);
    Ok(())
}
