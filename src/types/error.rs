//! Error types for version tracking and audit queries

use thiserror::Error;

/// Errors that can occur while tracking or querying versions
#[derive(Error, Debug)]
pub enum TrailError {
    /// The requested subject, record or entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A `"Type:id"` token could not be parsed
    #[error("Invalid composite key '{0}': expected \"Type:id\"")]
    InvalidCompositeKey(String),

    /// The entity type is not declared in the registry
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Stored snapshot bytes or a log line could not be decoded
    #[error("Data corruption in {location}: {reason}")]
    DataCorruption { location: String, reason: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrailError {
    /// Build a `DataCorruption` error
    pub fn corruption(location: impl Into<String>, reason: impl ToString) -> Self {
        TrailError::DataCorruption {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller should treat this as a missing resource
    ///
    /// Malformed composite keys and unknown types surface as NotFound to
    /// the search surface.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TrailError::NotFound(_)
                | TrailError::InvalidCompositeKey(_)
                | TrailError::UnknownEntityType(_)
        )
    }
}
