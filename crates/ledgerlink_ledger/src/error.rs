//! Error types for ledger operations.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur when accepting ledger data.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A field is missing or has the wrong primitive type.
    #[error("invalid block structure: {0}")]
    InvalidStructure(String),

    /// The stored hash does not match a fresh recomputation.
    #[error("hash mismatch at index {index}: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Block index.
        index: u64,
        /// Hash carried by the block.
        stored: String,
        /// Hash recomputed from the block's fields.
        computed: String,
    },

    /// The signed event has no usable id.
    #[error("signed event has no id")]
    MissingEventId,

    /// JSON decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
