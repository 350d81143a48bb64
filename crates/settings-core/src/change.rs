//! Change descriptors
//!
//! Every operation a run plans or performs, and every failure it hits, is
//! recorded as a [`ChangeDescriptor`]. Descriptors are created once and
//! never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// A planned or applied operation
    Info,
    /// A failure
    Error,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Counts of entries touched by an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub additions: usize,
    pub modifications: usize,
    pub deletions: usize,
}

impl ChangeSummary {
    /// One entry added.
    pub fn addition() -> Self {
        Self {
            additions: 1,
            ..Self::default()
        }
    }

    /// One entry modified.
    pub fn modification() -> Self {
        Self {
            modifications: 1,
            ..Self::default()
        }
    }

    /// One entry deleted.
    pub fn deletion() -> Self {
        Self {
            deletions: 1,
            ..Self::default()
        }
    }

    /// Whether nothing was touched.
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.modifications == 0 && self.deletions == 0
    }
}

impl std::ops::AddAssign for ChangeSummary {
    fn add_assign(&mut self, other: Self) {
        self.additions += other.additions;
        self.modifications += other.modifications;
        self.deletions += other.deletions;
    }
}

/// One planned operation, applied operation or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    /// Section (or subsystem) that produced the descriptor
    pub origin: String,
    /// Target resource
    pub repo: String,
    /// Severity
    pub kind: ChangeKind,
    /// Remote endpoint the operation addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Request body of the operation
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Entry counts
    pub summary: ChangeSummary,
    /// Human readable detail, always set for errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ChangeDescriptor {
    /// Describe an operation against `endpoint`.
    pub fn info(
        origin: impl Into<String>,
        repo: impl Into<String>,
        endpoint: impl Into<String>,
        payload: Value,
        summary: ChangeSummary,
    ) -> Self {
        Self {
            origin: origin.into(),
            repo: repo.into(),
            kind: ChangeKind::Info,
            endpoint: Some(endpoint.into()),
            payload,
            summary,
            message: None,
        }
    }

    /// Describe a failure.
    pub fn error(origin: impl Into<String>, repo: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            repo: repo.into(),
            kind: ChangeKind::Error,
            endpoint: None,
            payload: Value::Null,
            summary: ChangeSummary::default(),
            message: Some(message.into()),
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == ChangeKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_display() {
        assert_eq!(ChangeKind::Info.to_string(), "INFO");
        assert_eq!(ChangeKind::Error.to_string(), "ERROR");
    }

    #[test]
    fn summary_accumulates() {
        let mut total = ChangeSummary::default();
        assert!(total.is_empty());
        total += ChangeSummary::addition();
        total += ChangeSummary::deletion();
        total += ChangeSummary::deletion();
        assert_eq!(
            total,
            ChangeSummary {
                additions: 1,
                modifications: 0,
                deletions: 2
            }
        );
    }

    #[test]
    fn error_serializes_without_endpoint() {
        let descriptor = ChangeDescriptor::error("repository", "api", "boom");
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["kind"], json!("ERROR"));
        assert!(value.get("endpoint").is_none());
        assert!(value.get("payload").is_none());
        assert!(descriptor.is_error());
    }
}
