//! Order-preserving upsert of two entry lists by identity fields

use serde_json::Value;

use crate::merge::deep_merge;
use crate::value;

/// Merge two ordered entry lists by identity.
///
/// Every overlay entry is matched against the entries merged so far: an
/// object matches when it shares a non-empty value in any of
/// `identity_fields`, a scalar (or an object without identity) matches an
/// equal value. A match is replaced in place by the recursive merge of both
/// entries; an unmatched overlay entry is appended. Base entries that are not
/// superseded keep their position.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use settings_diff::merge_by_identity;
///
/// let base = vec![json!({"name": "bug", "color": "000"}), json!({"name": "docs"})];
/// let overlay = vec![json!({"name": "bug", "color": "c00"}), json!({"name": "new"})];
/// let merged = merge_by_identity(&["name"], &base, &overlay);
///
/// assert_eq!(merged, vec![
///     json!({"name": "bug", "color": "c00"}),
///     json!({"name": "docs"}),
///     json!({"name": "new"}),
/// ]);
/// ```
pub fn merge_by_identity<S: AsRef<str>>(
    identity_fields: &[S],
    base: &[Value],
    overlay: &[Value],
) -> Vec<Value> {
    let mut merged: Vec<Value> = base.to_vec();

    for entry in overlay {
        match merged
            .iter()
            .position(|candidate| same_identity(identity_fields, candidate, entry))
        {
            Some(position) => deep_merge(&mut merged[position], entry, identity_fields),
            None => merged.push(entry.clone()),
        }
    }

    merged
}

fn same_identity<S: AsRef<str>>(identity_fields: &[S], candidate: &Value, entry: &Value) -> bool {
    match (candidate, entry) {
        (Value::Object(candidate_map), Value::Object(entry_map)) => {
            let shared = identity_fields.iter().any(|field| {
                let field = field.as_ref();
                match (candidate_map.get(field), entry_map.get(field)) {
                    (Some(a), Some(b)) => value::is_identity_value(b) && a == b,
                    _ => false,
                }
            });
            if shared {
                return true;
            }
            value::identity_of(entry_map, identity_fields).is_none() && candidate == entry
        }
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn username_matches_when_name_absent() {
        let base = vec![json!({"username": "octocat", "permission": "pull"})];
        let overlay = vec![json!({"username": "octocat", "permission": "push"})];
        let merged = merge_by_identity(&["name", "username"], &base, &overlay);
        assert_eq!(merged, vec![json!({"username": "octocat", "permission": "push"})]);
    }

    #[test]
    fn scalars_are_deduplicated() {
        let base = vec![json!("rust"), json!("cli")];
        let overlay = vec![json!("cli"), json!("yaml")];
        let merged = merge_by_identity(&["name"], &base, &overlay);
        assert_eq!(merged, vec![json!("rust"), json!("cli"), json!("yaml")]);
    }

    #[test]
    fn entries_without_identity_append_unless_equal() {
        let base = vec![json!({"pattern": "main"})];
        let overlay = vec![json!({"pattern": "main"}), json!({"pattern": "dev"})];
        let merged = merge_by_identity(&["name"], &base, &overlay);
        assert_eq!(merged, vec![json!({"pattern": "main"}), json!({"pattern": "dev"})]);
    }

    #[test]
    fn nested_entries_merge_recursively() {
        let base = vec![json!({"name": "prod", "reviewers": [{"name": "ops"}], "wait_timer": 5})];
        let overlay = vec![json!({"name": "prod", "reviewers": [{"name": "sec"}]})];
        let merged = merge_by_identity(&["name"], &base, &overlay);
        assert_eq!(
            merged,
            vec![json!({
                "name": "prod",
                "reviewers": [{"name": "ops"}, {"name": "sec"}],
                "wait_timer": 5
            })]
        );
    }
}
