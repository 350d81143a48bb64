//! Organization directory lookups used for group matching

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Answers who has access to a resource and which properties it carries.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Slugs of the access groups (teams) with access to `repo`.
    async fn teams_for(&self, repo: &str) -> Result<Vec<String>>;

    /// Custom properties of `repo`.
    async fn properties_for(&self, repo: &str) -> Result<BTreeMap<String, Value>>;
}

/// Directory backed by fixed maps.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    teams: BTreeMap<String, Vec<String>>,
    properties: BTreeMap<String, BTreeMap<String, Value>>,
}

impl StaticDirectory {
    /// Create a directory that knows nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `team` access to `repo`.
    pub fn with_team(mut self, repo: impl Into<String>, team: impl Into<String>) -> Self {
        self.teams.entry(repo.into()).or_default().push(team.into());
        self
    }

    /// Set a custom property on `repo`.
    pub fn with_property(
        mut self,
        repo: impl Into<String>,
        property: impl Into<String>,
        value: Value,
    ) -> Self {
        self.properties
            .entry(repo.into())
            .or_default()
            .insert(property.into(), value);
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn teams_for(&self, repo: &str) -> Result<Vec<String>> {
        Ok(self.teams.get(repo).cloned().unwrap_or_default())
    }

    async fn properties_for(&self, repo: &str) -> Result<BTreeMap<String, Value>> {
        Ok(self.properties.get(repo).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn static_directory_lookups() {
        let directory = StaticDirectory::new()
            .with_team("api", "backend")
            .with_property("api", "tier", json!("gold"));

        assert_eq!(directory.teams_for("api").await.unwrap(), vec!["backend"]);
        assert!(directory.teams_for("web").await.unwrap().is_empty());
        assert_eq!(
            directory.properties_for("api").await.unwrap().get("tier"),
            Some(&json!("gold"))
        );
    }
}
