//! Error types for settings-diff

/// Result type for settings-diff operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging configuration trees
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A merge guard refused an override or a merged value
    #[error("{message}")]
    Rejected { section: String, message: String },

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a rejection for the given section
    pub fn rejected(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            section: section.into(),
            message: message.into(),
        }
    }
}
