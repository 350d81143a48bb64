//! Data-driven validator rules
//!
//! Rules are declared in configuration as `{plugin, error, rule}` entries:
//!
//! ```yaml
//! configvalidators:
//!   - plugin: collaborators
//!     error: Admin access cannot be granted to outside collaborators
//!     rule:
//!       kind: forbid_value
//!       field: permission
//!       values: [admin]
//! ```
//!
//! Field paths are dotted and fan out through arrays (see
//! [`settings_diff::lookup`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use settings_diff::value::{IDENTITY_FIELDS, identity_key, identity_of};
use settings_diff::lookup;

use super::SectionValidator;
use crate::error::{Error, Result};

/// One validator declaration, as found in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    /// Section the validator applies to
    pub plugin: String,
    /// Message reported when the validator fails
    pub error: String,
    /// Predicate to evaluate
    pub rule: Rule,
}

/// Predicate vocabulary for validators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// None of the values found at `field` may be one of `values`
    ForbidValue { field: String, values: Vec<Value> },

    /// Every value found at `field` must be one of `values`
    AllowValues { field: String, values: Vec<Value> },

    /// The section may hold at most `count` entries
    MaxItems { count: usize },

    /// A numeric `field` may not be lowered by an override
    NoDecrease { field: String },

    /// A `field` set by a lower layer may not be changed by an override
    Locked { field: String },
}

impl Rule {
    /// Reject rules that can never evaluate meaningfully.
    pub fn check(&self, section: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidRule {
            section: section.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Rule::ForbidValue { field, values } | Rule::AllowValues { field, values } => {
                if field.is_empty() {
                    return Err(invalid("field must not be empty"));
                }
                if values.is_empty() {
                    return Err(invalid("values must not be empty"));
                }
            }
            Rule::NoDecrease { field } | Rule::Locked { field } => {
                if field.is_empty() {
                    return Err(invalid("field must not be empty"));
                }
            }
            Rule::MaxItems { .. } => {}
        }
        Ok(())
    }

    /// Like [`Rule::check`], for rules registered against merged values.
    ///
    /// `no_decrease` and `locked` compare two layers and are rejected here.
    pub fn check_config(&self, section: &str) -> Result<()> {
        self.check(section)?;
        if self.is_override_only() {
            return Err(Error::InvalidRule {
                section: section.to_string(),
                reason: format!("{} only applies to override validators", self.kind()),
            });
        }
        Ok(())
    }

    /// Whether the rule needs both a lower and a higher layer to evaluate.
    pub fn is_override_only(&self) -> bool {
        matches!(self, Rule::NoDecrease { .. } | Rule::Locked { .. })
    }

    fn kind(&self) -> &'static str {
        match self {
            Rule::ForbidValue { .. } => "forbid_value",
            Rule::AllowValues { .. } => "allow_values",
            Rule::MaxItems { .. } => "max_items",
            Rule::NoDecrease { .. } => "no_decrease",
            Rule::Locked { .. } => "locked",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Rule::ForbidValue { field, values } => {
                !lookup(value, field).into_iter().any(|found| values.contains(found))
            }
            Rule::AllowValues { field, values } => {
                lookup(value, field).into_iter().all(|found| values.contains(found))
            }
            Rule::MaxItems { count } => match value {
                Value::Array(items) => items.len() <= *count,
                Value::Object(map) => map.len() <= *count,
                _ => true,
            },
            Rule::NoDecrease { .. } | Rule::Locked { .. } => true,
        }
    }
}

impl SectionValidator for Rule {
    fn is_valid(&self, merged: &Value) -> bool {
        self.accepts(merged)
    }

    fn can_override(&self, base: &Value, overlay: &Value) -> bool {
        match self {
            Rule::NoDecrease { field } => paired(base, overlay).into_iter().all(|(b, o)| {
                match (number(b, field), number(o, field)) {
                    (Some(before), Some(after)) => after >= before,
                    _ => true,
                }
            }),
            Rule::Locked { field } => paired(base, overlay).into_iter().all(|(b, o)| {
                let before = lookup(b, field);
                let after = lookup(o, field);
                before.is_empty() || after.is_empty() || before == after
            }),
            _ => self.accepts(overlay),
        }
    }
}

/// Pair up the nodes of two layers that describe the same thing.
///
/// Arrays pair entries by identity, anything else pairs the roots.
fn paired<'a>(base: &'a Value, overlay: &'a Value) -> Vec<(&'a Value, &'a Value)> {
    match (base, overlay) {
        (Value::Array(base_items), Value::Array(overlay_items)) => overlay_items
            .iter()
            .filter_map(|o| {
                let key = entry_key(o)?;
                base_items
                    .iter()
                    .find(|b| entry_key(b).as_deref() == Some(key.as_str()))
                    .map(|b| (b, o))
            })
            .collect(),
        _ => vec![(base, overlay)],
    }
}

fn entry_key(entry: &Value) -> Option<String> {
    let map = entry.as_object()?;
    identity_of(map, &IDENTITY_FIELDS).map(|(_, v)| identity_key(v))
}

fn number(value: &Value, field: &str) -> Option<f64> {
    lookup(value, field).first().and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(yaml: &str) -> Rule {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_tagged_rules() {
        let parsed = rule("kind: forbid_value\nfield: permission\nvalues: [admin]");
        assert_eq!(
            parsed,
            Rule::ForbidValue {
                field: "permission".into(),
                values: vec![json!("admin")]
            }
        );
        assert_eq!(rule("kind: max_items\ncount: 3"), Rule::MaxItems { count: 3 });
    }

    #[test]
    fn forbid_value_fans_out_through_arrays() {
        let r = rule("kind: forbid_value\nfield: permission\nvalues: [admin]");
        assert!(r.is_valid(&json!([{"username": "a", "permission": "push"}])));
        assert!(!r.is_valid(&json!([
            {"username": "a", "permission": "push"},
            {"username": "b", "permission": "admin"}
        ])));
    }

    #[test]
    fn allow_values_passes_when_field_absent() {
        let r = rule("kind: allow_values\nfield: visibility\nvalues: [private, internal]");
        assert!(r.is_valid(&json!({"has_wiki": true})));
        assert!(r.is_valid(&json!({"visibility": "internal"})));
        assert!(!r.is_valid(&json!({"visibility": "public"})));
    }

    #[test]
    fn max_items_counts_entries() {
        let r = Rule::MaxItems { count: 1 };
        assert!(r.is_valid(&json!([{"name": "a"}])));
        assert!(!r.is_valid(&json!([{"name": "a"}, {"name": "b"}])));
    }

    #[test]
    fn no_decrease_pairs_entries_by_identity() {
        let r = Rule::NoDecrease {
            field: "protection.required_pull_request_reviews.required_approving_review_count"
                .into(),
        };
        let base = json!([
            {"name": "main", "protection": {"required_pull_request_reviews": {"required_approving_review_count": 2}}}
        ]);
        let lowered = json!([
            {"name": "main", "protection": {"required_pull_request_reviews": {"required_approving_review_count": 1}}}
        ]);
        let other = json!([
            {"name": "dev", "protection": {"required_pull_request_reviews": {"required_approving_review_count": 0}}}
        ]);
        assert!(!r.can_override(&base, &lowered));
        assert!(r.can_override(&base, &other));
    }

    #[test]
    fn locked_field_cannot_change() {
        let r = Rule::Locked { field: "visibility".into() };
        assert!(!r.can_override(&json!({"visibility": "private"}), &json!({"visibility": "public"})));
        assert!(r.can_override(&json!({"visibility": "private"}), &json!({"has_wiki": false})));
        assert!(r.can_override(&json!({}), &json!({"visibility": "public"})));
    }

    #[test]
    fn empty_field_is_rejected() {
        let err = Rule::Locked { field: String::new() }.check("repository").unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
    }

    #[test]
    fn layer_rules_are_override_only() {
        let locked = rule("kind: locked\nfield: visibility");
        assert!(locked.check("repository").is_ok());
        let err = locked.check_config("repository").unwrap_err();
        assert!(err.to_string().contains("locked only applies to override validators"));
        assert!(rule("kind: max_items\ncount: 3").check_config("labels").is_ok());
    }
}
