//! Shared error types for the Engine.IO / Socket.IO wire format.

use thiserror::Error;

/// Errors raised while decoding or encoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{found}'")]
    UnknownPacketType { layer: &'static str, found: char },

    /// The frame is well formed but uses a feature this client does not speak
    /// (binary attachments, event without a name, ...).
    #[error("unsupported packet: {0}")]
    Unsupported(String),

    #[error("invalid namespace in packet: {0}")]
    InvalidNamespace(String),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
