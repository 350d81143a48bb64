//! Layered merge of configuration trees
//!
//! Overlays are applied in order, later overlays winning on scalar conflicts.
//! Nested objects are merged recursively and arrays are merged by identity.
//! Top-level sections are gated by a [`MergeGuard`]: before an overlay's
//! section is merged into the base's, the guard decides whether the override
//! is allowed, and afterwards whether the merged section is acceptable.

use serde_json::Value;

use crate::error::Result;
use crate::identity::merge_by_identity;
use crate::value::{self, IDENTITY_FIELDS};

/// Gate consulted at top-level section boundaries during a merge.
///
/// Implementations are looked up by section name only; nested keys never
/// reach the guard.
pub trait MergeGuard {
    /// Decide whether `overlay` may override `base` for `section`.
    fn can_override(&self, section: &str, base: &Value, overlay: &Value) -> Result<()>;

    /// Decide whether the merged value of `section` is acceptable.
    fn is_valid(&self, section: &str, merged: &Value) -> Result<()>;
}

/// Guard that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Unguarded;

impl MergeGuard for Unguarded {
    fn can_override(&self, _section: &str, _base: &Value, _overlay: &Value) -> Result<()> {
        Ok(())
    }

    fn is_valid(&self, _section: &str, _merged: &Value) -> Result<()> {
        Ok(())
    }
}

/// Merges a base tree with any number of overlays.
pub struct Merger<'g> {
    guard: &'g dyn MergeGuard,
    identity_fields: Vec<String>,
}

impl Merger<'static> {
    /// Create a merger without section gating.
    pub fn unguarded() -> Self {
        Merger::new(&Unguarded)
    }
}

impl<'g> Merger<'g> {
    /// Create a merger gated by `guard`, matching array entries on the
    /// default identity fields.
    pub fn new(guard: &'g dyn MergeGuard) -> Self {
        Self {
            guard,
            identity_fields: IDENTITY_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Replace the identity fields used to match array entries.
    pub fn with_identity_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Merge `overlays` onto `base` in order.
    ///
    /// An empty accumulated value is seeded by cloning the next non-empty
    /// overlay. Empty overlays are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rejected`] carrying the guard's message when a
    /// section override or merged section is refused. No merged value is
    /// produced in that case.
    pub fn merge(&self, base: &Value, overlays: &[&Value]) -> Result<Value> {
        let mut merged = base.clone();
        for overlay in overlays {
            if value::is_empty(overlay) {
                continue;
            }
            if value::is_empty(&merged) {
                merged = (*overlay).clone();
                continue;
            }
            self.merge_sections(&mut merged, overlay)?;
        }
        Ok(merged)
    }

    fn merge_sections(&self, target: &mut Value, overlay: &Value) -> Result<()> {
        if !(target.is_object() && overlay.is_object()) {
            deep_merge(target, overlay, &self.identity_fields);
            return Ok(());
        }
        let (Some(target_map), Some(overlay_map)) = (target.as_object_mut(), overlay.as_object())
        else {
            return Ok(());
        };

        for (section, overlay_value) in overlay_map {
            let mergeable = target_map
                .get(section)
                .is_some_and(|existing| same_container(existing, overlay_value));
            if !mergeable {
                target_map.insert(section.clone(), overlay_value.clone());
                continue;
            }
            let Some(existing) = target_map.get_mut(section) else {
                continue;
            };
            if existing.is_object() {
                self.guard.can_override(section, existing, overlay_value)?;
                deep_merge(existing, overlay_value, &self.identity_fields);
                self.guard.is_valid(section, existing)?;
            } else {
                deep_merge(existing, overlay_value, &self.identity_fields);
            }
        }
        Ok(())
    }
}

/// Merge `overlays` onto `base` without section gating.
pub fn merge(base: &Value, overlays: &[&Value]) -> Result<Value> {
    Merger::unguarded().merge(base, overlays)
}

/// Recursively merge `overlay` into `target`.
///
/// Objects merge key by key, arrays merge by identity, anything else is
/// replaced by the overlay value.
pub(crate) fn deep_merge<S: AsRef<str>>(target: &mut Value, overlay: &Value, identity_fields: &[S]) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let mergeable = target_map
                    .get(key)
                    .is_some_and(|existing| same_container(existing, overlay_value));
                if !mergeable {
                    target_map.insert(key.clone(), overlay_value.clone());
                } else if let Some(existing) = target_map.get_mut(key) {
                    deep_merge(existing, overlay_value, identity_fields);
                }
            }
        }
        (Value::Array(items), Value::Array(overlay_items)) => {
            *items = merge_by_identity(identity_fields, items, overlay_items);
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

fn same_container(a: &Value, b: &Value) -> bool {
    (a.is_object() && b.is_object()) || (a.is_array() && b.is_array())
}
