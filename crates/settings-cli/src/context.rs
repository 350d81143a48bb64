//! Everything a command needs: configuration, deployment and observed state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use settings_core::{
    AdapterRegistry, ConfigResolver, Deployment, FsConfigSource, MemoryDirectAdapter,
    MemoryListAdapter, MemoryStore,
};

use crate::error::{CliError, Result};

/// List-shaped sections served from the state snapshot
const LIST_SECTIONS: [&str; 9] = [
    "labels",
    "collaborators",
    "teams",
    "milestones",
    "autolinks",
    "environments",
    "rulesets",
    "custom_properties",
    "variables",
];

/// Sections reconciled as a whole
const DIRECT_SECTIONS: [&str; 2] = ["repository", "branches"];

pub struct Workspace {
    pub config_dir: PathBuf,
    pub deployment: Arc<Deployment>,
    pub store: Arc<MemoryStore>,
    pub state_path: PathBuf,
}

impl Workspace {
    /// Open a configuration directory.
    ///
    /// A missing state snapshot yields an empty store.
    pub async fn open(config_dir: &Path, deployment: Option<&Path>, state: Option<&Path>) -> Result<Self> {
        if !config_dir.join("settings.yml").is_file() {
            return Err(CliError::user(format!(
                "No settings.yml found in {}",
                config_dir.display()
            )));
        }

        let deployment = match deployment {
            Some(path) => Deployment::load(path).await?,
            None => {
                let default_path = config_dir.join("deployment.yml");
                if default_path.is_file() {
                    Deployment::load(&default_path).await?
                } else {
                    Deployment::default()
                }
            }
        };

        let state_path = state
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir.join("state.yml"));
        let store = match tokio::fs::read_to_string(&state_path).await {
            Ok(content) => MemoryStore::from_yaml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %state_path.display(), "No state snapshot, starting empty");
                MemoryStore::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            deployment: Arc::new(deployment),
            store: Arc::new(store),
            state_path,
        })
    }

    pub async fn resolver(&self) -> Result<ConfigResolver> {
        let resolver = ConfigResolver::load(
            self.deployment.clone(),
            Arc::new(FsConfigSource::new(&self.config_dir)),
            self.store.clone(),
        )
        .await?;
        Ok(resolver)
    }

    pub fn adapters(&self) -> AdapterRegistry {
        let mut adapters = AdapterRegistry::new();
        for section in DIRECT_SECTIONS {
            adapters.register_direct(Arc::new(MemoryDirectAdapter::new(
                self.store.clone(),
                section,
                &self.deployment,
            )));
        }
        for section in LIST_SECTIONS {
            adapters.register_list(Arc::new(MemoryListAdapter::new(
                self.store.clone(),
                section,
                &self.deployment,
            )));
        }
        adapters
    }

    /// The given repositories, or every repository in the snapshot.
    pub async fn targets(&self, repos: &[String]) -> Vec<String> {
        if repos.is_empty() {
            self.store.repositories().await
        } else {
            repos.to_vec()
        }
    }

    /// Write the store back to the snapshot file.
    pub async fn save_state(&self) -> Result<()> {
        let snapshot = self.store.snapshot().await;
        let yaml = serde_yaml::to_string(&snapshot)?;
        tokio::fs::write(&self.state_path, yaml).await?;
        tracing::debug!(path = %self.state_path.display(), "State snapshot written");
        Ok(())
    }
}
