//! Check-scope command implementation

use colored::Colorize;

use crate::context::Workspace;
use crate::error::Result;

/// Print whether each repository is in scope.
pub async fn run_check_scope(workspace: &Workspace, repos: &[String]) -> Result<()> {
    let resolver = workspace.resolver().await?;

    for repo in repos {
        if resolver.is_in_scope(repo) {
            println!("{} {}", "in scope".green(), repo);
        } else {
            println!("{} {}", "excluded".yellow(), repo);
        }
    }
    Ok(())
}
