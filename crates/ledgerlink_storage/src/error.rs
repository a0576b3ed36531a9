//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document could not be encoded or decoded as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not in the expected shape.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the data directory lock.
    #[error("data directory is locked by another process: {0}")]
    Locked(String),

    /// The path exists but is not usable as a data directory.
    #[error("invalid data directory: {0}")]
    InvalidDirectory(String),

    /// Writes were disabled (used by in-memory test backends).
    #[error("storage is read-only")]
    ReadOnly,
}
