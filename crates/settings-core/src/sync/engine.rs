//! Generic list reconciliation
//!
//! The `SyncEngine` compares the desired entries of a section with what the
//! adapter observes and issues adds, updates and removes through the
//! adapter. It never branches on the run mode; adapters do.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use super::adapter::{ListAdapter, SyncContext};
use crate::change::ChangeDescriptor;
use crate::error::{Error, Result};
use crate::glob::Glob;

/// Per-entry keys restricting which resources an entry applies to
const ENTRY_FILTER_KEYS: [&str; 2] = ["include", "exclude"];

/// One planned list operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Add(Value),
    Update { observed: Value, desired: Value },
    Remove(Value),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update { .. } => "update",
            Self::Remove(_) => "remove",
        }
    }
}

/// Reconciles one list section through a [`ListAdapter`].
pub struct SyncEngine {
    adapter: Arc<dyn ListAdapter>,
}

impl SyncEngine {
    pub fn new(adapter: Arc<dyn ListAdapter>) -> Self {
        Self { adapter }
    }

    /// Reconcile `desired` for the context's resource.
    ///
    /// A failing fetch is logged and yields no operations. Conflicts reported
    /// by the adapter are logged and dropped; other apply failures become
    /// error descriptors.
    ///
    /// # Errors
    ///
    /// Fails only when an entry's `include`/`exclude` pattern is invalid.
    pub async fn sync(&self, ctx: &SyncContext, desired: &Value) -> Result<Vec<ChangeDescriptor>> {
        let entries: &[Value] = match desired {
            Value::Array(items) => items,
            Value::Null => &[],
            other => {
                return Ok(vec![ChangeDescriptor::error(
                    &ctx.section,
                    &ctx.repo,
                    format!("Expected a list of entries, found {other}"),
                )]);
            }
        };
        let desired = filter_entries(&ctx.repo, entries)?;

        let observed = match self.adapter.fetch_observed(ctx).await {
            Ok(observed) => observed,
            Err(e) => {
                tracing::warn!(repo = %ctx.repo, section = %ctx.section, error = %e, "Failed to fetch observed state");
                return Ok(Vec::new());
            }
        };

        let operations = self.plan(&observed, &desired);
        tracing::debug!(
            repo = %ctx.repo,
            section = %ctx.section,
            mode = %ctx.mode,
            operations = operations.len(),
            "Planned section sync"
        );
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(operations.iter().map(|op| self.apply(ctx, op))).await;

        let mut changes = Vec::with_capacity(results.len());
        for (op, result) in operations.iter().zip(results) {
            match result {
                Ok(change) => changes.push(change),
                Err(e) if e.is_conflict() => {
                    tracing::warn!(repo = %ctx.repo, section = %ctx.section, error = %e, "Ignoring conflict");
                }
                Err(e) => {
                    tracing::error!(repo = %ctx.repo, section = %ctx.section, operation = op.name(), error = %e, "Operation failed");
                    changes.push(ChangeDescriptor::error(&ctx.section, &ctx.repo, e.to_string()));
                }
            }
        }
        Ok(changes)
    }

    /// Work out the operations turning `observed` into `desired`.
    pub fn plan(&self, observed: &[Value], desired: &[Value]) -> Vec<Operation> {
        let mut operations = Vec::new();

        for want in desired {
            match observed.iter().find(|have| self.adapter.identity(have, want)) {
                None => operations.push(Operation::Add(want.clone())),
                Some(have) if self.adapter.changed(have, want) => operations.push(Operation::Update {
                    observed: have.clone(),
                    desired: want.clone(),
                }),
                Some(_) => {}
            }
        }

        for have in observed {
            if !desired.iter().any(|want| self.adapter.identity(have, want)) {
                operations.push(Operation::Remove(have.clone()));
            }
        }

        operations
    }

    async fn apply(&self, ctx: &SyncContext, op: &Operation) -> Result<ChangeDescriptor> {
        match op {
            Operation::Add(desired) => self.adapter.add(ctx, desired).await,
            Operation::Update { observed, desired } => self.adapter.update(ctx, observed, desired).await,
            Operation::Remove(observed) => self.adapter.remove(ctx, observed).await,
        }
    }
}

/// Keep the entries that apply to `repo`, with their filter keys removed.
pub fn filter_entries(repo: &str, entries: &[Value]) -> Result<Vec<Value>> {
    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(map) = entry else {
            kept.push(entry.clone());
            continue;
        };
        if let Some(include) = map.get("include")
            && !matches_any(repo, include)?
        {
            continue;
        }
        if let Some(exclude) = map.get("exclude")
            && matches_any(repo, exclude)?
        {
            continue;
        }
        let stripped: Map<String, Value> = map
            .iter()
            .filter(|(key, _)| !ENTRY_FILTER_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        kept.push(Value::Object(stripped));
    }
    Ok(kept)
}

fn matches_any(repo: &str, patterns: &Value) -> Result<bool> {
    let patterns: Vec<&str> = match patterns {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(single) => vec![single.as_str()],
        Value::Null => Vec::new(),
        other => {
            return Err(Error::InvalidPattern {
                pattern: other.to_string(),
                reason: "entry include/exclude must list resource names".to_string(),
            });
        }
    };
    for pattern in patterns {
        if Glob::new(pattern)?.is_match(repo) {
            return Ok(true);
        }
    }
    Ok(false)
}
