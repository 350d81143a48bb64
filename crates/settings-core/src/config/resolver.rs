//! Effective configuration per resource
//!
//! The `ConfigResolver` merges three layers for a resource, lowest first:
//!
//! 1. Baseline (`settings.yml`), with control sections stripped
//! 2. The first group overlay whose membership matches the resource
//! 3. The resource's own overlay
//!
//! Scope is checked before anything is loaded, and every section is run
//! through the validator registry both against the unmerged layer pairs and
//! after merging.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use settings_diff::Merger;

use super::deployment::Deployment;
use super::directory::Directory;
use super::source::{ConfigSource, LayerLocator};
use crate::error::{Error, Result};
use crate::glob::Glob;
use crate::scope::ScopeFilter;
use crate::validator::{ValidatorRegistry, ValidatorSpec};

/// Sections that configure the run itself and are never merged
pub const CONTROL_SECTIONS: [&str; 3] = ["restrictedRepos", "configvalidators", "overridevalidators"];

/// Keys of a group document that describe membership
pub const MEMBERSHIP_SECTIONS: [&str; 3] = ["suborgrepos", "suborgteams", "suborgproperties"];

/// Section holding the resource name pattern
pub const NAME_VALIDATOR_SECTION: &str = "validator";

/// A group overlay with its membership rules
#[derive(Debug, Clone)]
struct GroupDocument {
    name: String,
    repos: Vec<Glob>,
    teams: Vec<String>,
    properties: Vec<(String, Value)>,
    overlay: Value,
}

impl GroupDocument {
    fn parse(name: &str, mut tree: Value) -> Result<Self> {
        let mut repos = Vec::new();
        let mut teams = Vec::new();
        let mut properties = Vec::new();

        if let Some(map) = tree.as_object_mut() {
            for entry in list(map.remove("suborgrepos")) {
                if let Some(pattern) = entry.as_str() {
                    repos.push(Glob::new(pattern)?);
                }
            }
            for entry in list(map.remove("suborgteams")) {
                let slug = match &entry {
                    Value::String(slug) => Some(slug.clone()),
                    Value::Object(team) => team
                        .get("slug")
                        .or_else(|| team.get("name"))
                        .and_then(Value::as_str)
                        .map(String::from),
                    _ => None,
                };
                teams.extend(slug);
            }
            for entry in list(map.remove("suborgproperties")) {
                if let Value::Object(pairs) = entry {
                    properties.extend(pairs);
                }
            }
            strip_control(map);
        }

        Ok(Self {
            name: name.to_string(),
            repos,
            teams,
            properties,
            overlay: tree,
        })
    }

    fn needs_teams(&self) -> bool {
        !self.teams.is_empty()
    }

    fn needs_properties(&self) -> bool {
        !self.properties.is_empty()
    }
}

/// The merged configuration of one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    /// Resource name
    pub repo: String,
    /// Group whose overlay was applied, if any
    pub group: Option<String>,
    /// Merged tree
    pub tree: Value,
}

impl EffectiveConfig {
    /// Value of a top-level section.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.tree.get(name)
    }

    /// All top-level sections in document order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.tree
            .as_object()
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Outcome of resolving a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The resource is out of scope
    Excluded,
    /// The effective configuration
    Resolved(EffectiveConfig),
}

/// Resolves the effective configuration of resources.
///
/// Baseline and group layers are loaded once by [`ConfigResolver::load`];
/// resource layers are loaded on every [`ConfigResolver::resolve`].
pub struct ConfigResolver {
    deployment: Arc<Deployment>,
    source: Arc<dyn ConfigSource>,
    directory: Arc<dyn Directory>,
    baseline: Value,
    groups: Vec<GroupDocument>,
    validators: ValidatorRegistry,
    scope: ScopeFilter,
    identity_fields: Vec<String>,
}

impl ConfigResolver {
    /// Load the shared layers and compile validators and scope.
    ///
    /// # Errors
    ///
    /// Fails when a layer cannot be loaded or parsed, or when a validator
    /// rule or scope pattern is malformed.
    pub async fn load(
        deployment: Arc<Deployment>,
        source: Arc<dyn ConfigSource>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        let mut baseline = source
            .load(&LayerLocator::Baseline)
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut validators = ValidatorRegistry::from_specs(
            &deployment.config_validators,
            &deployment.override_validators,
        )?;
        validators.extend_specs(
            &specs(&baseline, "configvalidators")?,
            &specs(&baseline, "overridevalidators")?,
        )?;

        let restricted = baseline
            .get("restrictedRepos")
            .or(deployment.restricted_repos.as_ref());
        let scope = ScopeFilter::from_value(restricted, &deployment.admin_repo)?;

        if let Some(map) = baseline.as_object_mut() {
            strip_control(map);
            if let Some(Value::Object(repository)) = map.get_mut("repository") {
                repository.remove("name");
            }
        }

        let mut groups = Vec::new();
        for name in source.groups().await? {
            let locator = LayerLocator::Group(name.clone());
            if let Some(tree) = source.load(&locator).await? {
                groups.push(GroupDocument::parse(&name, tree)?);
            }
        }

        let identity_fields = deployment.merge_identity_fields();
        tracing::debug!(
            groups = groups.len(),
            validators = validators.len(),
            "Configuration layers loaded"
        );

        Ok(Self {
            deployment,
            source,
            directory,
            baseline,
            groups,
            validators,
            scope,
            identity_fields,
        })
    }

    /// The deployment settings in effect.
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// The compiled validators.
    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// The baseline layer with control sections stripped.
    pub fn baseline(&self) -> &Value {
        &self.baseline
    }

    /// Names of the loaded group layers, in match order.
    pub fn groups(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Check whether a resource may be reconciled.
    pub fn is_in_scope(&self, repo: &str) -> bool {
        self.scope.is_in_scope(repo)
    }

    /// Find the first group whose membership includes `repo`.
    ///
    /// Rosters and properties are only queried when some group needs them.
    pub async fn match_group(&self, repo: &str) -> Result<Option<&str>> {
        let mut teams: Option<Vec<String>> = None;
        let mut properties: Option<BTreeMap<String, Value>> = None;

        for group in &self.groups {
            if group.repos.iter().any(|glob| glob.is_match(repo)) {
                return Ok(Some(group.name.as_str()));
            }

            if group.needs_teams() {
                if teams.is_none() {
                    teams = Some(self.directory.teams_for(repo).await?);
                }
                let roster = teams.as_deref().unwrap_or_default();
                if group
                    .teams
                    .iter()
                    .any(|wanted| roster.iter().any(|t| t.eq_ignore_ascii_case(wanted)))
                {
                    return Ok(Some(group.name.as_str()));
                }
            }

            if group.needs_properties() {
                if properties.is_none() {
                    properties = Some(self.directory.properties_for(repo).await?);
                }
                if let Some(actual) = &properties
                    && group
                        .properties
                        .iter()
                        .any(|(key, wanted)| actual.get(key).is_some_and(|v| property_matches(v, wanted)))
                {
                    return Ok(Some(group.name.as_str()));
                }
            }
        }
        Ok(None)
    }

    /// Compute the effective configuration of `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a validator rejects a section or
    /// the resource name does not match the `validator` pattern. Loading
    /// errors of the resource layer are passed through.
    pub async fn resolve(&self, repo: &str) -> Result<Resolution> {
        if !self.is_in_scope(repo) {
            tracing::info!(repo = %repo, "Resource is out of scope, skipping");
            return Ok(Resolution::Excluded);
        }
        tracing::debug!(repo = %repo, "Scope checked: included");

        let group_name = self.match_group(repo).await?;
        let group_overlay = group_name
            .and_then(|name| self.groups.iter().find(|g| g.name == name))
            .map(|g| &g.overlay);
        match group_name {
            Some(name) => tracing::debug!(repo = %repo, group = %name, "Group matched"),
            None => tracing::debug!(repo = %repo, "No group matched"),
        }

        let mut repo_layer = self
            .source
            .load(&LayerLocator::Repository(repo.to_string()))
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(map) = repo_layer.as_object_mut() {
            strip_control(map);
        }

        let empty = Value::Object(Map::new());
        let layers = [&self.baseline, group_overlay.unwrap_or(&empty), &repo_layer];
        self.precheck(&layers)?;

        let mut tree = Merger::new(&self.validators)
            .with_identity_fields(self.identity_fields.iter().cloned())
            .merge(&json!({}), &layers)?;

        if let Some(map) = tree.as_object() {
            for (section, value) in map {
                self.validators.check_valid(section, value)?;
            }
        }
        check_name_pattern(repo, tree.get(NAME_VALIDATOR_SECTION))?;
        force_repository_name(&mut tree, repo);
        tracing::debug!(repo = %repo, "Sections merged");

        Ok(Resolution::Resolved(EffectiveConfig {
            repo: repo.to_string(),
            group: group_name.map(String::from),
            tree,
        }))
    }

    /// Run override and config validators against unmerged layers.
    ///
    /// Every pair of consecutive layers defining a section is checked with
    /// the override validators, and every overlay's section with the config
    /// validators.
    fn precheck(&self, layers: &[&Value]) -> Result<()> {
        let mut sections: Vec<&str> = Vec::new();
        for layer in layers {
            for key in layer.as_object().into_iter().flat_map(|m| m.keys()) {
                if !sections.contains(&key.as_str()) {
                    sections.push(key);
                }
            }
        }

        for section in sections {
            let defined: Vec<&Value> = layers
                .iter()
                .filter_map(|layer| layer.get(section))
                .filter(|v| !settings_diff::is_empty(v))
                .collect();
            for pair in defined.windows(2) {
                self.validators.check_override(section, pair[0], pair[1])?;
            }
            for overlay in defined.iter().skip(1) {
                self.validators.check_valid(section, overlay)?;
            }
        }
        Ok(())
    }
}

fn list(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

fn strip_control(map: &mut Map<String, Value>) {
    for key in CONTROL_SECTIONS.iter().chain(MEMBERSHIP_SECTIONS.iter()) {
        map.remove(*key);
    }
}

fn specs(baseline: &Value, section: &str) -> Result<Vec<ValidatorSpec>> {
    match baseline.get(section) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| Error::InvalidRule {
            section: section.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn property_matches(actual: &Value, wanted: &Value) -> bool {
    match actual {
        Value::Array(values) => values.iter().any(|v| property_matches(v, wanted)),
        Value::String(s) => match wanted {
            Value::String(w) => s == w,
            other => s == &other.to_string(),
        },
        other => other == wanted,
    }
}

fn check_name_pattern(repo: &str, validator: Option<&Value>) -> Result<()> {
    let Some(pattern) = validator.and_then(|v| v.get("pattern")).and_then(Value::as_str) else {
        return Ok(());
    };
    let regex = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    if regex.is_match(repo) {
        return Ok(());
    }
    tracing::error!(repo = %repo, pattern = %pattern, "Resource name does not match pattern");
    Err(Error::Validation {
        section: NAME_VALIDATOR_SECTION.to_string(),
        message: format!("Repository name '{repo}' does not match pattern '{pattern}'"),
    })
}

fn force_repository_name(tree: &mut Value, repo: &str) {
    let Some(map) = tree.as_object_mut() else {
        return;
    };
    let repository = map
        .entry("repository")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(repository) = repository.as_object_mut() {
        repository.insert("name".to_string(), Value::String(repo.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfigSource, StaticDirectory};
    use pretty_assertions::assert_eq;

    async fn resolver(source: MemoryConfigSource, directory: StaticDirectory) -> ConfigResolver {
        ConfigResolver::load(
            Arc::new(Deployment::default()),
            Arc::new(source),
            Arc::new(directory),
        )
        .await
        .unwrap()
    }

    #[test]
    fn group_document_strips_membership() {
        let group = GroupDocument::parse(
            "web",
            json!({
                "suborgrepos": ["web-*"],
                "suborgteams": ["frontend", {"slug": "design"}],
                "suborgproperties": [{"tier": "gold"}],
                "labels": [{"name": "ui"}]
            }),
        )
        .unwrap();
        assert_eq!(group.repos.len(), 1);
        assert_eq!(group.teams, vec!["frontend", "design"]);
        assert_eq!(group.properties, vec![("tier".to_string(), json!("gold"))]);
        assert_eq!(group.overlay, json!({"labels": [{"name": "ui"}]}));
    }

    #[tokio::test]
    async fn first_matching_group_wins() {
        let source = MemoryConfigSource::new()
            .with_group("a-web", json!({"suborgrepos": ["web-*"]}))
            .with_group("b-all", json!({"suborgrepos": ["*"]}));
        let resolver = resolver(source, StaticDirectory::new()).await;

        assert_eq!(resolver.match_group("web-ui").await.unwrap(), Some("a-web"));
        assert_eq!(resolver.match_group("api").await.unwrap(), Some("b-all"));
    }

    #[tokio::test]
    async fn group_matched_by_roster_and_property() {
        let source = MemoryConfigSource::new()
            .with_group("backend", json!({"suborgteams": ["Core"]}))
            .with_group("gold", json!({"suborgproperties": [{"tier": "gold"}]}));
        let directory = StaticDirectory::new()
            .with_team("api", "core")
            .with_property("billing", "tier", json!("gold"));
        let resolver = resolver(source, directory).await;

        assert_eq!(resolver.match_group("api").await.unwrap(), Some("backend"));
        assert_eq!(resolver.match_group("billing").await.unwrap(), Some("gold"));
        assert_eq!(resolver.match_group("docs").await.unwrap(), None);
    }

    #[tokio::test]
    async fn repository_name_is_forced() {
        let source = MemoryConfigSource::new()
            .with_baseline(json!({"repository": {"name": "template", "private": true}}));
        let resolver = resolver(source, StaticDirectory::new()).await;

        let Resolution::Resolved(config) = resolver.resolve("api").await.unwrap() else {
            panic!("expected a resolved configuration");
        };
        assert_eq!(
            config.section("repository"),
            Some(&json!({"private": true, "name": "api"}))
        );
    }

    #[tokio::test]
    async fn name_pattern_mismatch_is_a_validation_error() {
        let source = MemoryConfigSource::new()
            .with_baseline(json!({"validator": {"pattern": "^[a-z-]+$"}}));
        let resolver = resolver(source, StaticDirectory::new()).await;

        assert!(resolver.resolve("good-name").await.is_ok());
        let err = resolver.resolve("Bad_Name").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.section(), Some("validator"));
    }

    #[test]
    fn property_values_match_multi_select() {
        assert!(property_matches(&json!(["a", "b"]), &json!("b")));
        assert!(property_matches(&json!("true"), &json!(true)));
        assert!(!property_matches(&json!("x"), &json!("y")));
    }
}
