//! Deployment settings
//!
//! Process-level settings that sit outside the configuration layers: scope
//! restrictions, validators, section identities and noise fields. A
//! [`Deployment`] is constructed explicitly and handed to the resolver.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use settings_diff::Comparator;

use crate::error::{Error, Result};
use crate::validator::ValidatorSpec;

/// Fields that change on every read of remote state
pub const DEFAULT_IGNORABLE_FIELDS: [&str; 4] = ["id", "node_id", "created_at", "updated_at"];

/// Identity fields per section when none are configured
const BUILTIN_IDENTITIES: [(&str, &str); 9] = [
    ("labels", "name"),
    ("teams", "name"),
    ("rulesets", "name"),
    ("environments", "name"),
    ("branches", "name"),
    ("custom_properties", "name"),
    ("collaborators", "username"),
    ("autolinks", "key_prefix"),
    ("milestones", "title"),
];

/// How entries of a section are identified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Identity fields, in lookup order
    pub identity: Vec<String>,
}

/// Settings for one reconciler process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    /// Exclusion list or `{include, exclude}` pattern sets
    pub restricted_repos: Option<Value>,

    /// Validators for merged sections
    #[serde(rename = "configvalidators")]
    pub config_validators: Vec<ValidatorSpec>,

    /// Validators for section overrides
    #[serde(rename = "overridevalidators")]
    pub override_validators: Vec<ValidatorSpec>,

    /// Per-section identity overrides
    pub sections: BTreeMap<String, SectionSpec>,

    /// Extra keys ignored when comparing desired and observed state
    pub ignorable_fields: Vec<String>,

    /// Name of the administration resource, always out of scope
    pub admin_repo: String,

    /// Resources reconciled at once during a sweep
    pub concurrency: usize,
}

impl Default for Deployment {
    fn default() -> Self {
        Self {
            restricted_repos: None,
            config_validators: Vec::new(),
            override_validators: Vec::new(),
            sections: BTreeMap::new(),
            ignorable_fields: DEFAULT_IGNORABLE_FIELDS.iter().map(|f| f.to_string()).collect(),
            admin_repo: "admin".to_string(),
            concurrency: 8,
        }
    }
}

impl Deployment {
    /// Parse deployment settings from YAML.
    ///
    /// An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut deployment: Self = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigLoad {
            locator: "deployment settings".to_string(),
            reason: e.to_string(),
        })?;
        if deployment.concurrency == 0 {
            deployment.concurrency = 1;
        }
        Ok(deployment)
    }

    /// Load deployment settings from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "Loaded deployment settings");
        Self::parse(&content)
    }

    /// Identity spec for a section, falling back to built-in defaults.
    pub fn section_spec(&self, section: &str) -> SectionSpec {
        if let Some(spec) = self.sections.get(section) {
            return spec.clone();
        }
        let identity = BUILTIN_IDENTITIES
            .iter()
            .find(|(name, _)| *name == section)
            .map(|(_, field)| vec![field.to_string()])
            .unwrap_or_else(|| {
                settings_diff::IDENTITY_FIELDS
                    .iter()
                    .map(|f| f.to_string())
                    .collect()
            });
        SectionSpec { identity }
    }

    /// Identity fields used when merging layers.
    ///
    /// The conventional fields come first, followed by every section-specific
    /// field, so entries of any section find their partner.
    pub fn merge_identity_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = settings_diff::IDENTITY_FIELDS
            .iter()
            .map(|f| f.to_string())
            .collect();
        let configured = self.sections.values().flat_map(|spec| spec.identity.iter().cloned());
        let builtin = BUILTIN_IDENTITIES.iter().map(|(_, field)| field.to_string());
        for field in builtin.chain(configured) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// Comparator honouring the configured noise fields.
    pub fn comparator(&self) -> Comparator {
        Comparator::with_ignorable_fields(self.ignorable_fields.iter().cloned())
    }
}
