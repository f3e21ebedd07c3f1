//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message failed to encode or decode
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer answered with its error status
    #[error("Peer error: {0}")]
    Peer(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
