//! Error taxonomy for catalog operations.
//!
//! Every public operation returns a tagged result built on
//! [`KnowledgeError`]; nothing panics or propagates a raw collaborator
//! error across the public boundary. Collaborator and storage failures
//! are wrapped as [`KnowledgeError::OperationFailed`] carrying the
//! original message.

use serde::Serialize;
use thiserror::Error;

/// Unified error type for catalog and pipeline operations.
#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum KnowledgeError {
    /// A unit, lineage, or manifest was looked up and does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unit, source, or trace with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A required field was empty or a value was out of range.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An illegal state-machine transition or an operation the current
    /// state forbids (mutating an archived unit, removing the last
    /// active source).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An unexpected failure from a collaborator or storage backend,
    /// carrying the original error's code and message.
    #[error("operation failed [{code}]: {message}")]
    OperationFailed { code: String, message: String },
}

impl KnowledgeError {
    /// Wrap a boundary failure with a machine-readable code.
    pub fn operation_failed(code: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            code: code.into(),
            message: source.to_string(),
        }
    }

    /// Machine-readable kind label for logs and wire responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Validation(_) => "validation",
            Self::InvalidState(_) => "invalid_state",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Result type alias using [`KnowledgeError`].
pub type Result<T> = std::result::Result<T, KnowledgeError>;
