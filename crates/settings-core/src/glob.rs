//! Wildcard patterns for resource names
//!
//! `*` matches any run of characters except `/`, `?` matches a single
//! character except `/`, and `/` matches itself. Every other character is
//! literal. Wildcards are captured so a [`Glob`] can also drive replacements
//! (`$1`, `$2`, ... refer to the wildcards in order).

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a wildcard pattern.
    ///
    /// # Example
    ///
    /// ```
    /// use settings_core::Glob;
    ///
    /// let glob = Glob::new("api-*").unwrap();
    /// assert!(glob.is_match("api-gateway"));
    /// assert!(!glob.is_match("web-api"));
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let source = format!("^{}$", translate(pattern));
        let regex = Regex::new(&source).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The original wildcard pattern.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Test a name against the pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Replace a full match of `input`, expanding `$n` to the n-th wildcard.
    ///
    /// Returns `input` unchanged when it does not match.
    pub fn replace(&self, input: &str, replacement: &str) -> String {
        self.regex.replace(input, replacement).into_owned()
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => out.push_str("([^/]*)"),
            '?' => out.push_str("([^/])"),
            '/' => out.push('/'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out
}
