//! Where configuration layers come from
//!
//! A [`ConfigSource`] hands out one untyped tree per layer. A layer that does
//! not exist is `Ok(None)` and is merged as an empty layer; anything else
//! that goes wrong while loading is an error.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Identifies one configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerLocator {
    /// Organization-wide defaults
    Baseline,
    /// Overlay shared by a group of resources
    Group(String),
    /// Overlay for a single resource
    Repository(String),
}

impl fmt::Display for LayerLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerLocator::Baseline => write!(f, "baseline"),
            LayerLocator::Group(name) => write!(f, "group '{}'", name),
            LayerLocator::Repository(name) => write!(f, "repository '{}'", name),
        }
    }
}

/// Provider of configuration layers
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load a layer; `Ok(None)` when it does not exist.
    async fn load(&self, locator: &LayerLocator) -> Result<Option<Value>>;

    /// Names of all group layers.
    async fn groups(&self) -> Result<Vec<String>>;
}

/// Reads YAML layers from a directory.
///
/// ```text
/// <root>/settings.yml        baseline
/// <root>/suborgs/<name>.yml  group overlays
/// <root>/repos/<name>.yml    resource overlays
/// ```
#[derive(Debug, Clone)]
pub struct FsConfigSource {
    root: PathBuf,
}

impl FsConfigSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configuration directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a layer.
    pub fn path_for(&self, locator: &LayerLocator) -> PathBuf {
        match locator {
            LayerLocator::Baseline => self.root.join("settings.yml"),
            LayerLocator::Group(name) => self.root.join("suborgs").join(format!("{name}.yml")),
            LayerLocator::Repository(name) => self.root.join("repos").join(format!("{name}.yml")),
        }
    }
}

#[async_trait]
impl ConfigSource for FsConfigSource {
    async fn load(&self, locator: &LayerLocator) -> Result<Option<Value>> {
        let path = self.path_for(locator);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(layer = %locator, path = %path.display(), "Layer not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::ConfigLoad {
                    locator: locator.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        parse_layer(locator, &content).map(Some)
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let dir = self.root.join("suborgs");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut groups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                groups.push(stem.to_string());
            }
        }
        groups.sort();
        Ok(groups)
    }
}

/// Parse a YAML layer document; an empty document is an empty layer.
pub fn parse_layer(locator: &LayerLocator, content: &str) -> Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let value: Value = serde_yaml::from_str(content).map_err(|e| Error::ConfigLoad {
        locator: locator.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(Error::ConfigLoad {
            locator: locator.to_string(),
            reason: format!("expected a mapping, found {other}"),
        }),
    }
}

/// Serves layers from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigSource {
    layers: BTreeMap<LayerLocator, Value>,
}

impl MemoryConfigSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baseline layer.
    pub fn with_baseline(mut self, tree: Value) -> Self {
        self.layers.insert(LayerLocator::Baseline, tree);
        self
    }

    /// Add a group layer.
    pub fn with_group(mut self, name: impl Into<String>, tree: Value) -> Self {
        self.layers.insert(LayerLocator::Group(name.into()), tree);
        self
    }

    /// Add a resource layer.
    pub fn with_repository(mut self, name: impl Into<String>, tree: Value) -> Self {
        self.layers.insert(LayerLocator::Repository(name.into()), tree);
        self
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn load(&self, locator: &LayerLocator) -> Result<Option<Value>> {
        Ok(self.layers.get(locator).cloned())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        Ok(self
            .layers
            .keys()
            .filter_map(|locator| match locator {
                LayerLocator::Group(name) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locator_display() {
        assert_eq!(LayerLocator::Baseline.to_string(), "baseline");
        assert_eq!(LayerLocator::Group("web".into()).to_string(), "group 'web'");
        assert_eq!(
            LayerLocator::Repository("api".into()).to_string(),
            "repository 'api'"
        );
    }

    #[test]
    fn fs_paths() {
        let source = FsConfigSource::new("/cfg");
        assert_eq!(source.path_for(&LayerLocator::Baseline), PathBuf::from("/cfg/settings.yml"));
        assert_eq!(
            source.path_for(&LayerLocator::Group("web".into())),
            PathBuf::from("/cfg/suborgs/web.yml")
        );
    }

    #[test]
    fn parse_layer_rejects_scalars() {
        assert_eq!(parse_layer(&LayerLocator::Baseline, "").unwrap(), json!({}));
        assert_eq!(parse_layer(&LayerLocator::Baseline, "~").unwrap(), json!({}));
        assert!(parse_layer(&LayerLocator::Baseline, "just text").is_err());
    }

    #[tokio::test]
    async fn memory_source_serves_layers() {
        let source = MemoryConfigSource::new()
            .with_baseline(json!({"repository": {"has_issues": true}}))
            .with_group("b", json!({}))
            .with_group("a", json!({}));

        assert!(source.load(&LayerLocator::Baseline).await.unwrap().is_some());
        assert!(source
            .load(&LayerLocator::Repository("api".into()))
            .await
            .unwrap()
            .is_none());
        assert_eq!(source.groups().await.unwrap(), vec!["a", "b"]);
    }
}
