//! Error types for the conversation storage subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Storage subsystem error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed conversation, file or index entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller input rejected before any I/O took place.
    #[error("validation error: {0}")]
    Validation(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A JSON document could not be parsed and the policy is fail-loud.
    #[error("corrupt document {}: {reason}", path.display())]
    Corrupt {
        /// Document that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Transcript pattern construction error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Build a `NotFound` error for a conversation id.
    #[must_use]
    pub fn conversation_not_found(id: &str) -> Self {
        Self::NotFound(format!("conversation {id}"))
    }

    /// Check whether this error reports a missing conversation or file.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check whether this error reports rejected caller input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Convenience result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
