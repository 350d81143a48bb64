//! Shape helpers shared by comparison and merging

use serde_json::{Map, Value};

/// Fields that identify an entry of an object array, in lookup order
pub const IDENTITY_FIELDS: [&str; 3] = ["name", "username", "login"];

/// Array keys holding membership lists whose entries may be spelled
/// differently on each side (plain slugs vs API objects)
pub const MEMBERSHIP_KEYS: [&str; 3] = ["teams", "users", "apps"];

/// Check whether a value is structurally empty.
///
/// `null`, an object without keys and an array whose elements are all
/// empty count as empty. Scalars (including `false`, `0` and `""`) do not.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.iter().all(is_empty),
        _ => false,
    }
}

/// An empty value of the same container kind as `shape`.
pub fn empty_like(shape: &Value) -> Value {
    match shape {
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

/// Check whether an identity value is usable for matching.
pub(crate) fn is_identity_value(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Number(_) | Value::Bool(_) => true,
        _ => false,
    }
}

/// Find the first identity field carried by an object.
///
/// Returns the field name together with its value.
pub fn identity_of<'a, S: AsRef<str>>(
    map: &'a Map<String, Value>,
    fields: &'a [S],
) -> Option<(&'a str, &'a Value)> {
    fields.iter().find_map(|field| {
        let field = field.as_ref();
        map.get(field)
            .filter(|v| is_identity_value(v))
            .map(|v| (field, v))
    })
}

/// Render an identity value as a ledger key.
pub fn identity_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve a dotted path (`a.b.c`) against a value.
///
/// Arrays encountered along the way fan out, so `protection.checks.context`
/// yields the `context` of every entry of `checks`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for node in current {
            collect_segment(node, segment, &mut next);
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn collect_segment<'a>(node: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        _ => {}
    }
}
