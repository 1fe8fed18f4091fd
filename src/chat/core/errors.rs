//! Error types for the chat streaming subsystem.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Chat subsystem error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Endpoint template could not be turned into a websocket URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// Websocket protocol or transport error.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),
    /// Connecting took longer than the configured timeout.
    #[error("connect timed out after {0} seconds")]
    ConnectTimeout(u64),
    /// The outbound half of the transport is gone.
    #[error("transport closed")]
    TransportClosed,
    /// The session controller has been torn down and cannot be reused.
    #[error("session has been torn down")]
    SessionTornDown,
    /// The session controller was already mounted.
    #[error("session is already mounted")]
    AlreadyMounted,
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tungstenite::Error> for ChatError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
