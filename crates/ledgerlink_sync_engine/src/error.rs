//! Error types for the sync engine.

use ledgerlink_ledger::LedgerError;
use ledgerlink_storage::StorageError;
use ledgerlink_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A block or event was rejected.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The replicated store rejected a write.
    #[error("store error: {0}")]
    Store(String),

    /// Timed out waiting for the relay.
    #[error("operation timed out")]
    Timeout,

    /// Not connected to a relay.
    #[error("not connected to relay")]
    NotConnected,

    /// The node driver has stopped.
    #[error("node has shut down")]
    Shutdown,
}

impl SyncError {
    /// Returns true if reconnecting may clear this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Timeout | SyncError::NotConnected
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
