//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but not a message envelope.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The `type` tag is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The payload does not match the shape its `type` requires.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Message type.
        kind: &'static str,
        /// Decoder error.
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Returns true for frames that should be dropped without any noise.
    ///
    /// Unknown types are worth a debug line; everything else is junk.
    pub fn is_silent(&self) -> bool {
        !matches!(self, ProtocolError::UnknownType(_))
    }
}
