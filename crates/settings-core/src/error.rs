//! Error types for settings-core

use std::path::PathBuf;

/// Result type for settings-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or reconciling settings
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A validator refused an override or a merged section
    #[error("{message}")]
    Validation { section: String, message: String },

    /// A name or glob pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A validator rule is malformed
    #[error("Invalid validator rule for {section}: {reason}")]
    InvalidRule { section: String, reason: String },

    /// A configuration document exists but could not be read or parsed
    #[error("Failed to load {locator}: {reason}")]
    ConfigLoad { locator: String, reason: String },

    /// Configuration file not found at an explicitly requested path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Observed state could not be fetched
    #[error("Failed to fetch {section} for {repo}: {reason}")]
    Fetch {
        repo: String,
        section: String,
        reason: String,
    },

    /// A mutation against the remote state failed
    #[error("{operation} {section} failed for {repo}: {reason}")]
    Apply {
        repo: String,
        section: String,
        operation: String,
        reason: String,
    },

    /// The entry to create is already present remotely
    #[error("{what} already exists")]
    AlreadyExists { what: String },

    /// No adapter is registered for a section
    #[error("No adapter registered for section '{0}'")]
    UnknownSection(String),

    /// Diff/merge error that is not a validator rejection
    #[error(transparent)]
    Diff(settings_diff::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an apply failure
    pub fn apply(
        repo: impl Into<String>,
        section: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Apply {
            repo: repo.into(),
            section: section.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Conflicts are logged and swallowed by the sync engine
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether this error is a validator rejection
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The section an error relates to, if any
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Validation { section, .. }
            | Self::InvalidRule { section, .. }
            | Self::Fetch { section, .. }
            | Self::Apply { section, .. } => Some(section),
            Self::UnknownSection(section) => Some(section),
            _ => None,
        }
    }
}

impl From<settings_diff::Error> for Error {
    fn from(err: settings_diff::Error) -> Self {
        match err {
            settings_diff::Error::Rejected { section, message } => {
                Self::Validation { section, message }
            }
            other => Self::Diff(other),
        }
    }
}
