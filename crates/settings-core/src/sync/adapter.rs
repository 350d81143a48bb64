//! Section adapters
//!
//! An adapter connects one configuration section to the remote state it
//! describes. List-shaped sections (labels, collaborators, ...) implement
//! [`ListAdapter`] and are driven by the [`SyncEngine`](super::SyncEngine);
//! sections that map onto a single remote object implement
//! [`DirectAdapter`] and reconcile themselves.
//!
//! Adapters decide what dry-run means: in [`RunMode::DryRun`] they return
//! descriptors of what they would do and leave remote state untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::change::ChangeDescriptor;
use crate::config::{CONTROL_SECTIONS, EffectiveConfig, NAME_VALIDATOR_SECTION};
use crate::error::Result;

/// Sections handled outside generic dispatch
pub const RESOURCE_SECTIONS: [&str; 2] = ["repository", "repositories"];

/// Whether operations are planned or performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Live,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Live }
    }

    pub fn is_dry_run(self) -> bool {
        self == Self::DryRun
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// What an adapter call is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub repo: String,
    pub section: String,
    pub mode: RunMode,
}

impl SyncContext {
    pub fn new(repo: impl Into<String>, section: impl Into<String>, mode: RunMode) -> Self {
        Self {
            repo: repo.into(),
            section: section.into(),
            mode,
        }
    }
}

/// Adapter for a section holding a list of entries.
#[async_trait]
pub trait ListAdapter: Send + Sync {
    /// Section this adapter serves.
    fn section(&self) -> &str;

    /// Current remote entries.
    async fn fetch_observed(&self, ctx: &SyncContext) -> Result<Vec<Value>>;

    /// Whether an observed and a desired entry describe the same thing.
    fn identity(&self, observed: &Value, desired: &Value) -> bool;

    /// Whether an observed entry must be updated to match the desired one.
    fn changed(&self, observed: &Value, desired: &Value) -> bool;

    async fn add(&self, ctx: &SyncContext, desired: &Value) -> Result<ChangeDescriptor>;

    async fn update(
        &self,
        ctx: &SyncContext,
        observed: &Value,
        desired: &Value,
    ) -> Result<ChangeDescriptor>;

    async fn remove(&self, ctx: &SyncContext, observed: &Value) -> Result<ChangeDescriptor>;
}

/// Adapter for a section that maps onto a single remote object.
#[async_trait]
pub trait DirectAdapter: Send + Sync {
    /// Section this adapter serves.
    fn section(&self) -> &str;

    /// Reconcile the section, returning one descriptor per operation.
    async fn sync(&self, ctx: &SyncContext, desired: &Value) -> Result<Vec<ChangeDescriptor>>;
}

/// A registered adapter of either shape
#[derive(Clone)]
pub enum SectionAdapter {
    List(Arc<dyn ListAdapter>),
    Direct(Arc<dyn DirectAdapter>),
}

impl fmt::Debug for SectionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(adapter) => write!(f, "List({})", adapter.section()),
            Self::Direct(adapter) => write!(f, "Direct({})", adapter.section()),
        }
    }
}

/// Adapters keyed by section name
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, SectionAdapter>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a list adapter under its section, replacing any previous one.
    pub fn register_list(&mut self, adapter: Arc<dyn ListAdapter>) {
        self.adapters
            .insert(adapter.section().to_string(), SectionAdapter::List(adapter));
    }

    /// Register a direct adapter under its section, replacing any previous one.
    pub fn register_direct(&mut self, adapter: Arc<dyn DirectAdapter>) {
        self.adapters
            .insert(adapter.section().to_string(), SectionAdapter::Direct(adapter));
    }

    pub fn get(&self, section: &str) -> Option<&SectionAdapter> {
        self.adapters.get(section)
    }

    pub fn contains(&self, section: &str) -> bool {
        self.adapters.contains_key(section)
    }

    /// Registered section names, sorted.
    pub fn sections(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Pair each dispatchable section of `config` with its adapter.
    ///
    /// Resource-level sections, control sections and sections without an
    /// adapter are skipped.
    pub fn dispatch<'c>(&self, config: &'c EffectiveConfig) -> Vec<(&'c str, &'c Value, SectionAdapter)> {
        config
            .sections()
            .filter(|(section, _)| !is_reserved(section))
            .filter_map(|(section, value)| match self.adapters.get(section) {
                Some(adapter) => Some((section, value, adapter.clone())),
                None => {
                    tracing::debug!(repo = %config.repo, section = %section, "No adapter for section, ignoring");
                    None
                }
            })
            .collect()
    }
}

fn is_reserved(section: &str) -> bool {
    RESOURCE_SECTIONS.contains(&section)
        || CONTROL_SECTIONS.contains(&section)
        || section == NAME_VALIDATOR_SECTION
}
