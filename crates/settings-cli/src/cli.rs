//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Settings reconciler - apply layered settings to repositories
#[derive(Parser, Debug)]
#[command(name = "settings-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration directory (settings.yml, suborgs/, repos/)
    #[arg(short, long, global = true, default_value = ".", env = "SETTINGS_CONFIG_DIR")]
    pub config: PathBuf,

    /// Deployment settings file [default: <config>/deployment.yml if present]
    #[arg(long, global = true)]
    pub deployment: Option<PathBuf>,

    /// Observed state snapshot [default: <config>/state.yml]
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the effective configuration of a repository
    Resolve {
        /// Repository name
        repo: String,

        /// Output as JSON instead of YAML
        #[arg(long)]
        json: bool,
    },

    /// Preview the changes a sync would make
    ///
    /// Examples:
    ///   settings-sync plan              # every repository in the state snapshot
    ///   settings-sync plan api web      # selected repositories
    ///   settings-sync plan --json       # machine-readable report
    Plan {
        /// Repositories to plan for [default: all known repositories]
        repos: Vec<String>,

        /// Output as JSON for CI/CD integration
        #[arg(long)]
        json: bool,
    },

    /// Apply changes to the observed state snapshot
    Apply {
        /// Repositories to reconcile [default: all known repositories]
        repos: Vec<String>,

        /// Output as JSON for CI/CD integration
        #[arg(long)]
        json: bool,
    },

    /// Report whether repositories are in scope
    CheckScope {
        /// Repository names
        #[arg(required = true)]
        repos: Vec<String>,
    },
}
