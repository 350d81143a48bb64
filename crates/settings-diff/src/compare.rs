//! Structural comparison of configuration trees
//!
//! [`Comparator::compare`] walks an overlay (the desired value) against a
//! base (the observed value or a lower layer) and reports what the overlay
//! adds and what it modifies. Removals are not materialized here; the sync
//! engine tracks unmatched observed entries on its own.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::value::{self, IDENTITY_FIELDS, MEMBERSHIP_KEYS};

/// Maximum recursion depth before nested values are compared as scalars
const MAX_COMPARE_DEPTH: usize = 128;

/// Synthetic key used to run top-level arrays through the object walk
const ARRAY_FIELD: &str = "__array";

/// Result of comparing an overlay against a base value
///
/// `additions` and `modifications` mirror the shape of the compared values:
/// objects for objects, arrays for arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diff {
    /// Fields and entries present only in the overlay
    pub additions: Value,
    /// Fields whose overlay value differs from the base value
    pub modifications: Value,
    /// Whether the overlay differs from the base at all
    #[serde(rename = "hasChanges")]
    pub has_changes: bool,
}

impl Diff {
    fn unchanged(shape: &Value) -> Self {
        Self {
            additions: value::empty_like(shape),
            modifications: value::empty_like(shape),
            has_changes: false,
        }
    }
}

/// Structural comparator with a configurable set of noise fields.
///
/// Any key containing `url` (case-insensitive) is noise. Additional exact
/// key names can be supplied with [`Comparator::with_ignorable_fields`].
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    ignorable_fields: Vec<String>,
}

impl Comparator {
    /// Create a comparator that only filters `url` keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a comparator that also ignores the given keys.
    pub fn with_ignorable_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignorable_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Keys ignored in addition to `url` keys.
    pub fn ignorable_fields(&self) -> &[String] {
        &self.ignorable_fields
    }

    /// Check whether a key is excluded from comparison.
    pub fn is_noise(&self, key: &str) -> bool {
        key.to_ascii_lowercase().contains("url") || self.ignorable_fields.iter().any(|f| f == key)
    }

    /// Copy a value with every noise key removed, at any depth.
    pub fn strip_noise(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !self.is_noise(key))
                    .map(|(key, v)| (key.clone(), self.strip_noise(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.strip_noise(v)).collect()),
            other => other.clone(),
        }
    }

    /// Compare an overlay against a base value.
    ///
    /// Neither input is modified. `None` and `null` are treated alike.
    pub fn compare(&self, base: Option<&Value>, overlay: Option<&Value>) -> Diff {
        let base = base.filter(|b| !b.is_null());

        let overlay = match overlay {
            Some(o) if !value::is_empty(o) => o,
            _ => {
                // A value disappearing is a change even though nothing is added.
                let shape = overlay.or(base).unwrap_or(&Value::Null);
                let mut diff = Diff::unchanged(shape);
                diff.has_changes = base.is_some_and(|b| !value::is_empty(b));
                return diff;
            }
        };

        // Scalars are compared by the caller.
        if !overlay.is_object() && !overlay.is_array() {
            return Diff::unchanged(overlay);
        }

        let base = match base {
            Some(b) if !value::is_empty(b) => b,
            _ => {
                let additions = self.strip_noise(overlay);
                let has_changes = !value::is_empty(&additions);
                return Diff {
                    additions,
                    modifications: value::empty_like(overlay),
                    has_changes,
                };
            }
        };

        if overlay.is_array() || base.is_array() {
            let base_map = wrap(base);
            let overlay_map = wrap(overlay);
            let (mut additions, mut modifications) = self.compare_maps(&base_map, &overlay_map, 0);
            let additions = additions
                .remove(ARRAY_FIELD)
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let modifications = modifications
                .remove(ARRAY_FIELD)
                .unwrap_or_else(|| Value::Array(Vec::new()));
            return finish(additions, modifications);
        }

        let empty = Map::new();
        let base_map = base.as_object().unwrap_or(&empty);
        let overlay_map = overlay.as_object().unwrap_or(&empty);
        let (additions, modifications) = self.compare_maps(base_map, overlay_map, 0);
        finish(Value::Object(additions), Value::Object(modifications))
    }

    fn compare_maps(
        &self,
        base: &Map<String, Value>,
        overlay: &Map<String, Value>,
        depth: usize,
    ) -> (Map<String, Value>, Map<String, Value>) {
        let mut additions = Map::new();
        let mut modifications = Map::new();

        for (key, overlay_value) in overlay {
            if self.is_noise(key) {
                continue;
            }
            let base_value = base.get(key).filter(|b| !b.is_null());

            match (base_value, overlay_value) {
                (Some(Value::Array(base_items)), Value::Array(overlay_items))
                    if depth < MAX_COMPARE_DEPTH =>
                {
                    let (added, modified) =
                        self.compare_arrays(key, base_items, overlay_items, depth + 1);
                    if !added.is_empty() {
                        additions.insert(key.clone(), Value::Array(added));
                    }
                    if !modified.is_empty() {
                        modifications.insert(key.clone(), Value::Array(modified));
                    }
                }
                (Some(Value::Object(base_child)), Value::Object(overlay_child))
                    if !base_child.is_empty() && depth < MAX_COMPARE_DEPTH =>
                {
                    let (added, modified) = self.compare_maps(base_child, overlay_child, depth + 1);
                    if !added.is_empty() {
                        additions.insert(key.clone(), Value::Object(added));
                    }
                    if !modified.is_empty() {
                        modifications.insert(key.clone(), Value::Object(modified));
                    }
                }
                (Some(base_value), overlay_value) if !value::is_empty(base_value) => {
                    if self.strip_noise(base_value) != self.strip_noise(overlay_value) {
                        modifications.insert(key.clone(), self.strip_noise(overlay_value));
                    }
                }
                (_, overlay_value) => {
                    if overlay_value.is_null() {
                        continue;
                    }
                    let added = self.strip_noise(overlay_value);
                    if is_delta(&added) {
                        additions.insert(key.clone(), added);
                    }
                }
            }
        }

        if !modifications.is_empty()
            && let Some((field, id)) = value::identity_of(overlay, &IDENTITY_FIELDS)
        {
            modifications
                .entry(field.to_string())
                .or_insert_with(|| id.clone());
        }

        (additions, modifications)
    }

    fn compare_arrays(
        &self,
        key: &str,
        base: &[Value],
        overlay: &[Value],
        depth: usize,
    ) -> (Vec<Value>, Vec<Value>) {
        let mut ledger = Ledger::default();
        for entry in overlay {
            ledger.slot(self.ledger_keys(entry)).overlay.get_or_insert(entry);
        }
        for entry in base {
            ledger.pair_base(self.ledger_keys(entry), entry);
        }

        let mut nested_additions = Vec::new();
        let mut new_entries = Vec::new();
        let mut remainder = Vec::new();
        let mut modifications = Vec::new();

        for slot in ledger.slots {
            match (slot.base, slot.overlay) {
                (Some(Value::Object(base_entry)), Some(Value::Object(overlay_entry))) => {
                    let (added, modified) = self.compare_maps(base_entry, overlay_entry, depth);
                    let identity = value::identity_of(overlay_entry, &IDENTITY_FIELDS);
                    if !added.is_empty() {
                        nested_additions.push(annotate(added, identity));
                    }
                    if !modified.is_empty() {
                        modifications.push(annotate(modified, identity));
                    }
                }
                (Some(_), Some(_)) => {}
                (None, Some(overlay_entry)) => {
                    let added = self.strip_noise(overlay_entry);
                    if is_delta(&added) {
                        new_entries.push(added);
                    }
                }
                (Some(base_entry), None) => remainder.push(self.strip_noise(base_entry)),
                (None, None) => {}
            }
        }

        // Membership lists: a renamed slug and a new slug look alike, so the
        // larger side decides what is reported.
        if MEMBERSHIP_KEYS.contains(&key) && !new_entries.is_empty() && remainder.len() > new_entries.len()
        {
            tracing::trace!(key, "membership remainder outweighs additions");
            new_entries = remainder;
        }

        nested_additions.extend(new_entries);
        (nested_additions, modifications)
    }

    /// Keys an entry is paired under.
    ///
    /// Objects pair when they share a value in any identity field, the way
    /// merging matches them. A plain slug pairs with an equal slug or with an
    /// object whose first identity value it spells.
    fn ledger_keys(&self, entry: &Value) -> LedgerKeys {
        match entry {
            Value::Object(map) => {
                let mut qualified: Vec<String> = IDENTITY_FIELDS
                    .iter()
                    .filter_map(|field| {
                        map.get(*field)
                            .filter(|v| value::is_identity_value(v))
                            .map(|v| format!("{field}={}", value::identity_key(v)))
                    })
                    .collect();
                let Some((_, id)) = value::identity_of(map, &IDENTITY_FIELDS) else {
                    let whole = vec![format!("{{}}{}", self.strip_noise(entry))];
                    return LedgerKeys {
                        lookup: whole.clone(),
                        register: whole,
                    };
                };
                let id = value::identity_key(id);
                let mut lookup = qualified.clone();
                lookup.push(format!("#{id}"));
                qualified.push(format!("@{id}"));
                LedgerKeys {
                    lookup,
                    register: qualified,
                }
            }
            other => {
                let id = value::identity_key(other);
                LedgerKeys {
                    lookup: vec![format!("#{id}"), format!("@{id}")],
                    register: vec![format!("#{id}")],
                }
            }
        }
    }
}

/// Compare with a comparator that only filters `url` keys.
pub fn compare(base: Option<&Value>, overlay: Option<&Value>) -> Diff {
    Comparator::new().compare(base, overlay)
}

#[derive(Default)]
struct Slot<'a> {
    base: Option<&'a Value>,
    overlay: Option<&'a Value>,
}

struct LedgerKeys {
    lookup: Vec<String>,
    register: Vec<String>,
}

/// Insertion-ordered pairing of entries from both sides by identity
#[derive(Default)]
struct Ledger<'a> {
    slots: Vec<Slot<'a>>,
    index: HashMap<String, usize>,
}

impl<'a> Ledger<'a> {
    fn slot(&mut self, keys: LedgerKeys) -> &mut Slot<'a> {
        let found = keys.lookup.iter().find_map(|key| self.index.get(key).copied());
        let position = match found {
            Some(position) => position,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        self.register(keys.register, position);
        &mut self.slots[position]
    }

    /// Pair a base entry with the first matching slot that has no base yet.
    ///
    /// An entry whose every match is already paired is a duplicate and is
    /// dropped.
    fn pair_base(&mut self, keys: LedgerKeys, entry: &'a Value) {
        let mut matched = false;
        let mut free = None;
        for key in &keys.lookup {
            if let Some(&position) = self.index.get(key) {
                matched = true;
                if self.slots[position].base.is_none() {
                    free = Some(position);
                    break;
                }
            }
        }
        let position = match free {
            Some(position) => position,
            None if matched => return,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        self.slots[position].base = Some(entry);
        self.register(keys.register, position);
    }

    fn register(&mut self, keys: Vec<String>, position: usize) {
        for key in keys {
            self.index.entry(key).or_insert(position);
        }
    }
}

fn wrap(value: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(ARRAY_FIELD.to_string(), value.clone());
    map
}

fn annotate(mut record: Map<String, Value>, identity: Option<(&str, &Value)>) -> Value {
    if let Some((field, id)) = identity {
        record
            .entry(field.to_string())
            .or_insert_with(|| id.clone());
    }
    Value::Object(record)
}

/// A recorded delta must carry something; `null` counts as an explicit clear.
fn is_delta(value: &Value) -> bool {
    value.is_null() || !value::is_empty(value)
}

fn finish(additions: Value, modifications: Value) -> Diff {
    let has_changes = !value::is_empty(&additions) || !value::is_empty(&modifications);
    Diff {
        additions,
        modifications,
        has_changes,
    }
}
