//! In-memory remote state
//!
//! [`MemoryStore`] holds observed state as `resource -> section -> value`.
//! The adapters in this module reconcile against it the way API-backed
//! adapters would against a remote service, reporting the endpoint each
//! operation would address.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use settings_diff::Comparator;
use settings_diff::value::{identity_key, identity_of};
use tokio::sync::RwLock;

use super::adapter::{DirectAdapter, ListAdapter, SyncContext};
use crate::change::{ChangeDescriptor, ChangeSummary};
use crate::config::{Deployment, Directory};
use crate::error::{Error, Result};

type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

/// Observed state shared by the memory adapters
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a `{resource: {section: value}}` tree.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        let state: Snapshot = match snapshot {
            Value::Null => Snapshot::new(),
            other => serde_json::from_value(other.clone())?,
        };
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Parse a YAML snapshot.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let snapshot: Value = serde_yaml::from_str(yaml)?;
        Self::from_snapshot(&snapshot)
    }

    /// Register a resource without any state.
    pub async fn add_repository(&self, repo: impl Into<String>) {
        self.state.write().await.entry(repo.into()).or_default();
    }

    /// Known resources, sorted.
    pub async fn repositories(&self) -> Vec<String> {
        self.state.read().await.keys().cloned().collect()
    }

    /// Observed value of a section.
    ///
    /// `None` for a known resource without the section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] for an unknown resource.
    pub async fn section(&self, repo: &str, section: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        let sections = state.get(repo).ok_or_else(|| Error::Fetch {
            repo: repo.to_string(),
            section: section.to_string(),
            reason: "repository not found".to_string(),
        })?;
        Ok(sections.get(section).cloned())
    }

    pub async fn set_section(&self, repo: &str, section: &str, value: Value) {
        self.state
            .write()
            .await
            .entry(repo.to_string())
            .or_default()
            .insert(section.to_string(), value);
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> Value {
        let state = self.state.read().await;
        serde_json::to_value(&*state).unwrap_or(Value::Null)
    }

    async fn with_entries<T>(
        &self,
        ctx: &SyncContext,
        f: impl FnOnce(&mut Vec<Value>) -> Result<T> + Send,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        let sections = state.get_mut(&ctx.repo).ok_or_else(|| Error::apply(
            &ctx.repo,
            &ctx.section,
            "write",
            "repository not found",
        ))?;
        let value = sections
            .entry(ctx.section.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(entries) = value else {
            return Err(Error::apply(&ctx.repo, &ctx.section, "write", "section is not a list"));
        };
        f(entries)
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn teams_for(&self, repo: &str) -> Result<Vec<String>> {
        let teams = match self.section(repo, "teams").await {
            Ok(Some(Value::Array(teams))) => teams,
            _ => return Ok(Vec::new()),
        };
        Ok(teams
            .iter()
            .filter_map(|team| match team {
                Value::String(slug) => Some(slug.clone()),
                Value::Object(map) => map
                    .get("slug")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .map(String::from),
                _ => None,
            })
            .collect())
    }

    async fn properties_for(&self, repo: &str) -> Result<BTreeMap<String, Value>> {
        let properties = match self.section(repo, "custom_properties").await {
            Ok(Some(Value::Array(properties))) => properties,
            _ => return Ok(BTreeMap::new()),
        };
        Ok(properties
            .iter()
            .filter_map(|entry| {
                let name = entry
                    .get("name")
                    .or_else(|| entry.get("property_name"))
                    .and_then(Value::as_str)?;
                Some((name.to_string(), entry.get("value").cloned().unwrap_or(Value::Null)))
            })
            .collect())
    }
}

/// List adapter over a [`MemoryStore`] section
pub struct MemoryListAdapter {
    store: Arc<MemoryStore>,
    section: String,
    identity: Vec<String>,
    comparator: Comparator,
}

impl MemoryListAdapter {
    /// Create an adapter for `section` using the deployment's identity and
    /// noise settings.
    pub fn new(store: Arc<MemoryStore>, section: impl Into<String>, deployment: &Deployment) -> Self {
        let section = section.into();
        Self {
            identity: deployment.section_spec(&section).identity,
            comparator: deployment.comparator(),
            store,
            section,
        }
    }

    fn key_of(&self, entry: &Value) -> Option<String> {
        let map = entry.as_object()?;
        identity_of(map, &self.identity).map(|(_, v)| identity_key(v))
    }

    fn entry_id(&self, entry: &Value) -> String {
        self.key_of(entry).unwrap_or_else(|| identity_key(entry))
    }

    fn endpoint(&self, method: &str, ctx: &SyncContext, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{method} /repos/{}/{}/{id}", ctx.repo, self.section),
            None => format!("{method} /repos/{}/{}", ctx.repo, self.section),
        }
    }

    fn same_entry(&self, a: &Value, b: &Value) -> bool {
        match (self.key_of(a), self.key_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    }
}

#[async_trait]
impl ListAdapter for MemoryListAdapter {
    fn section(&self) -> &str {
        &self.section
    }

    async fn fetch_observed(&self, ctx: &SyncContext) -> Result<Vec<Value>> {
        match self.store.section(&ctx.repo, &self.section).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries),
            Some(_) => Err(Error::Fetch {
                repo: ctx.repo.clone(),
                section: self.section.clone(),
                reason: "observed section is not a list".to_string(),
            }),
        }
    }

    fn identity(&self, observed: &Value, desired: &Value) -> bool {
        match desired.as_object().and_then(|map| identity_of(map, &self.identity)) {
            Some((field, wanted)) => observed
                .get(field)
                .is_some_and(|have| identity_key(have) == identity_key(wanted)),
            None => observed == desired,
        }
    }

    fn changed(&self, observed: &Value, desired: &Value) -> bool {
        self.comparator.compare(Some(observed), Some(desired)).has_changes
    }

    async fn add(&self, ctx: &SyncContext, desired: &Value) -> Result<ChangeDescriptor> {
        if !ctx.mode.is_dry_run() {
            self.store
                .with_entries(ctx, |entries| {
                    if entries.iter().any(|e| self.same_entry(e, desired)) {
                        return Err(Error::AlreadyExists {
                            what: format!("{} '{}'", self.section, self.entry_id(desired)),
                        });
                    }
                    entries.push(desired.clone());
                    Ok(())
                })
                .await?;
        }
        Ok(ChangeDescriptor::info(
            &self.section,
            &ctx.repo,
            self.endpoint("POST", ctx, None),
            desired.clone(),
            ChangeSummary::addition(),
        ))
    }

    async fn update(
        &self,
        ctx: &SyncContext,
        observed: &Value,
        desired: &Value,
    ) -> Result<ChangeDescriptor> {
        let id = self.entry_id(observed);
        if !ctx.mode.is_dry_run() {
            let updated = settings_diff::merge(observed, &[desired])?;
            self.store
                .with_entries(ctx, |entries| {
                    match entries.iter_mut().find(|e| self.same_entry(e, observed)) {
                        Some(entry) => *entry = updated,
                        None => entries.push(updated),
                    }
                    Ok(())
                })
                .await?;
        }
        Ok(ChangeDescriptor::info(
            &self.section,
            &ctx.repo,
            self.endpoint("PATCH", ctx, Some(&id)),
            desired.clone(),
            ChangeSummary::modification(),
        ))
    }

    async fn remove(&self, ctx: &SyncContext, observed: &Value) -> Result<ChangeDescriptor> {
        let id = self.entry_id(observed);
        if !ctx.mode.is_dry_run() {
            self.store
                .with_entries(ctx, |entries| {
                    entries.retain(|e| !self.same_entry(e, observed));
                    Ok(())
                })
                .await?;
        }
        Ok(ChangeDescriptor::info(
            &self.section,
            &ctx.repo,
            self.endpoint("DELETE", ctx, Some(&id)),
            Value::Null,
            ChangeSummary::deletion(),
        )
        .with_message(format!("'{id}' is not declared in configuration")))
    }
}

/// Direct adapter over a [`MemoryStore`] section holding one object
pub struct MemoryDirectAdapter {
    store: Arc<MemoryStore>,
    section: String,
    comparator: Comparator,
}

impl MemoryDirectAdapter {
    pub fn new(store: Arc<MemoryStore>, section: impl Into<String>, deployment: &Deployment) -> Self {
        Self {
            store,
            section: section.into(),
            comparator: deployment.comparator(),
        }
    }

    fn endpoint(&self, repo: &str) -> String {
        if self.section == "repository" {
            format!("PATCH /repos/{repo}")
        } else {
            format!("PUT /repos/{repo}/{}", self.section)
        }
    }
}

#[async_trait]
impl DirectAdapter for MemoryDirectAdapter {
    fn section(&self) -> &str {
        &self.section
    }

    async fn sync(&self, ctx: &SyncContext, desired: &Value) -> Result<Vec<ChangeDescriptor>> {
        let observed = self.store.section(&ctx.repo, &self.section).await?;
        let diff = self.comparator.compare(observed.as_ref(), Some(desired));
        if !diff.has_changes {
            return Ok(Vec::new());
        }

        let summary = ChangeSummary {
            additions: count_fields(&diff.additions),
            modifications: count_fields(&diff.modifications),
            deletions: 0,
        };
        let payload = settings_diff::merge(&diff.additions, &[&diff.modifications])?;

        if !ctx.mode.is_dry_run() {
            let base = observed.unwrap_or_else(|| Value::Object(Map::new()));
            let updated = settings_diff::merge(&base, &[desired])?;
            self.store.set_section(&ctx.repo, &self.section, updated).await;
        }

        Ok(vec![ChangeDescriptor::info(
            &self.section,
            &ctx.repo,
            self.endpoint(&ctx.repo),
            payload,
            summary,
        )])
    }
}

fn count_fields(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RunMode;
    use serde_json::json;

    fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::from_snapshot(&json!({
                "api": {
                    "labels": [{"name": "bug", "color": "ff0000", "url": "https://x/bug"}],
                    "teams": [{"slug": "core", "permission": "push"}, "docs"],
                    "custom_properties": [{"name": "tier", "value": "gold"}]
                }
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn unknown_repository_fails_fetch() {
        let store = store();
        let adapter = MemoryListAdapter::new(store, "labels", &Deployment::default());
        let ctx = SyncContext::new("missing", "labels", RunMode::DryRun);
        assert!(matches!(adapter.fetch_observed(&ctx).await, Err(Error::Fetch { .. })));
    }

    #[tokio::test]
    async fn identity_ignores_noise_on_changed() {
        let adapter = MemoryListAdapter::new(store(), "labels", &Deployment::default());
        let observed = json!({"name": "bug", "color": "ff0000", "url": "https://x/bug", "id": 7});
        let desired = json!({"name": "bug", "color": "ff0000"});
        assert!(adapter.identity(&observed, &desired));
        assert!(!adapter.changed(&observed, &desired));
        assert!(adapter.changed(&observed, &json!({"name": "bug", "color": "00ff00"})));
    }

    #[tokio::test]
    async fn live_add_conflict() {
        let store = store();
        let adapter = MemoryListAdapter::new(store.clone(), "labels", &Deployment::default());
        let ctx = SyncContext::new("api", "labels", RunMode::Live);
        let err = adapter.add(&ctx, &json!({"name": "bug"})).await.unwrap_err();
        assert!(err.is_conflict());

        let change = adapter.add(&ctx, &json!({"name": "docs"})).await.unwrap();
        assert_eq!(change.endpoint.as_deref(), Some("POST /repos/api/labels"));
        assert_eq!(
            store.section("api", "labels").await.unwrap().unwrap().as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn removal_explains_itself() {
        let store = store();
        let adapter = MemoryListAdapter::new(store.clone(), "labels", &Deployment::default());
        let ctx = SyncContext::new("api", "labels", RunMode::DryRun);
        let change = adapter.remove(&ctx, &json!({"name": "bug"})).await.unwrap();
        assert_eq!(change.endpoint.as_deref(), Some("DELETE /repos/api/labels/bug"));
        assert_eq!(change.message.as_deref(), Some("'bug' is not declared in configuration"));
        assert!(!change.is_error());
        assert_eq!(
            store.section("api", "labels").await.unwrap().unwrap().as_array().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn direct_adapter_reports_field_counts() {
        let store = store();
        store
            .set_section("api", "repository", json!({"has_wiki": true, "private": true}))
            .await;
        let adapter = MemoryDirectAdapter::new(store.clone(), "repository", &Deployment::default());
        let ctx = SyncContext::new("api", "repository", RunMode::Live);

        let changes = adapter
            .sync(&ctx, &json!({"has_wiki": false, "description": "API"}))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].endpoint.as_deref(), Some("PATCH /repos/api"));
        assert_eq!(changes[0].summary.additions, 1);
        assert_eq!(changes[0].summary.modifications, 1);
        assert_eq!(
            store.section("api", "repository").await.unwrap(),
            Some(json!({"has_wiki": false, "private": true, "description": "API"}))
        );

        let again = adapter
            .sync(&ctx, &json!({"has_wiki": false, "description": "API"}))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn store_as_directory() {
        let store = store();
        assert_eq!(store.teams_for("api").await.unwrap(), vec!["core", "docs"]);
        assert_eq!(
            store.properties_for("api").await.unwrap().get("tier"),
            Some(&json!("gold"))
        );
        assert!(store.teams_for("missing").await.unwrap().is_empty());
    }
}
