//! Error types for agentry-state

use thiserror::Error;

/// Errors produced by audit and task storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Record not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A terminal record already exists and cannot be overwritten
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend rejected or failed the write
    #[error("storage backend failed: {0}")]
    Backend(String),

    /// Payload (de)serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
