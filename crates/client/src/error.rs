//! Client error types.

use sightline_shared::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not establish or keep the connection. Absorbed by
    /// the connection manager; only transports and tests see it as a value.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("socket is not connected")]
    NotConnected,

    #[error("socket context read outside of a SocketProvider")]
    OutsideProvider,

    #[error("no tokio runtime available to drive the connection")]
    NoRuntime,

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
