//! Which resources a run may touch
//!
//! `restrictedRepos` comes in two forms:
//!
//! - a plain list of names that are excluded
//! - an object with `include` and/or `exclude` lists of regular expressions,
//!   matched anywhere in the resource name
//!
//! When both lists are given, a resource must match `include` and must not
//! match `exclude`.
//!
//! The administration resource and its meta resources are always excluded.

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

/// Resources excluded regardless of configuration, next to the admin resource
const META_RESOURCES: [&str; 2] = [".github", ".github-private"];

/// Compiled restriction list
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    excluded_names: Vec<String>,
    include: Option<Vec<Regex>>,
    exclude: Option<Vec<Regex>>,
    always_excluded: Vec<String>,
}

impl ScopeFilter {
    /// Build a filter from a `restrictedRepos` value.
    ///
    /// # Errors
    ///
    /// Returns an error when the value has an unexpected shape or a pattern
    /// is not a valid regular expression.
    pub fn from_value(value: Option<&Value>, admin_repo: &str) -> Result<Self> {
        let mut filter = Self {
            always_excluded: std::iter::once(admin_repo)
                .chain(META_RESOURCES)
                .map(String::from)
                .collect(),
            ..Default::default()
        };

        match value {
            None | Some(Value::Null) => {}
            Some(Value::Array(names)) => {
                filter.excluded_names = strings(names, "restrictedRepos")?;
            }
            Some(Value::Object(map)) => {
                if let Some(include) = map.get("include") {
                    filter.include = Some(compile(include, "restrictedRepos.include")?);
                }
                if let Some(exclude) = map.get("exclude") {
                    filter.exclude = Some(compile(exclude, "restrictedRepos.exclude")?);
                }
            }
            Some(other) => {
                return Err(Error::InvalidPattern {
                    pattern: other.to_string(),
                    reason: "restrictedRepos must be a list or an include/exclude object".into(),
                });
            }
        }

        Ok(filter)
    }

    /// Check whether a resource may be reconciled.
    pub fn is_in_scope(&self, repo: &str) -> bool {
        !self.is_restricted(repo)
    }

    /// Check whether a resource is excluded from reconciliation.
    pub fn is_restricted(&self, repo: &str) -> bool {
        if self.always_excluded.iter().any(|name| name == repo) {
            return true;
        }
        if self.excluded_names.iter().any(|name| name == repo) {
            return true;
        }
        if let Some(include) = &self.include
            && !include.iter().any(|re| re.is_match(repo))
        {
            return true;
        }
        if let Some(exclude) = &self.exclude
            && exclude.iter().any(|re| re.is_match(repo))
        {
            return true;
        }
        false
    }
}

fn strings(items: &[Value], what: &str) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| {
            item.as_str().map(String::from).ok_or_else(|| Error::InvalidPattern {
                pattern: item.to_string(),
                reason: format!("{what} entries must be strings"),
            })
        })
        .collect()
}

fn compile(value: &Value, what: &str) -> Result<Vec<Regex>> {
    let patterns = match value {
        Value::Array(items) => strings(items, what)?,
        Value::String(single) => vec![single.clone()],
        other => {
            return Err(Error::InvalidPattern {
                pattern: other.to_string(),
                reason: format!("{what} must be a list of patterns"),
            });
        }
    };
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("foo", true)]
    #[case("my-repo-test", true)]
    #[case("random", false)]
    fn include_patterns(#[case] repo: &str, #[case] in_scope: bool) {
        let value = json!({"include": ["foo", ".*-test$"]});
        let filter = ScopeFilter::from_value(Some(&value), "admin").unwrap();
        assert_eq!(filter.is_in_scope(repo), in_scope);
    }

    #[rstest]
    #[case("api", true)]
    #[case("legacy-api", false)]
    #[case("sandbox", false)]
    fn exclude_patterns(#[case] repo: &str, #[case] in_scope: bool) {
        let value = json!({"exclude": ["^legacy-", "^sandbox$"]});
        let filter = ScopeFilter::from_value(Some(&value), "admin").unwrap();
        assert_eq!(filter.is_in_scope(repo), in_scope);
    }

    #[test]
    fn plain_list_excludes_exact_names() {
        let value = json!(["secret", "vault"]);
        let filter = ScopeFilter::from_value(Some(&value), "admin").unwrap();
        assert!(filter.is_restricted("secret"));
        assert!(filter.is_in_scope("secret-santa"));
    }

    #[test]
    fn missing_restrictions_allow_everything_but_admin() {
        let filter = ScopeFilter::from_value(None, "org-admin").unwrap();
        assert!(filter.is_in_scope("anything"));
        assert!(filter.is_restricted("org-admin"));
        assert!(filter.is_restricted(".github"));
    }

    #[test]
    fn include_cannot_readmit_admin() {
        let value = json!({"include": [".*"]});
        let filter = ScopeFilter::from_value(Some(&value), "admin").unwrap();
        assert!(filter.is_restricted("admin"));
    }

    #[test]
    fn include_and_exclude_combine() {
        let value = json!({"include": ["^api-"], "exclude": ["-old$"]});
        let filter = ScopeFilter::from_value(Some(&value), "admin").unwrap();
        assert!(filter.is_in_scope("api-core"));
        assert!(filter.is_restricted("api-old"));
        assert!(filter.is_restricted("web-core"));
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let value = json!({"exclude": ["("]});
        let err = ScopeFilter::from_value(Some(&value), "admin").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }
}
