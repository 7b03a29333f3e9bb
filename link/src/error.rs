//! Error types for realtime-link.
//!
//! Errors stay inside the crate for the most part: the public API is
//! callback based, so transport and protocol failures are logged and routed
//! to the `on_error` listeners instead of being returned. Only
//! [`RealtimeClientBuilder::build`](crate::RealtimeClientBuilder::build)
//! hands a [`RealtimeError`] back to the caller.

use thiserror::Error;

/// Errors that can occur inside the realtime client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    /// Invalid endpoint, options, or missing runtime at construction time.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Socket could not be opened, written, or read.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// A frame could not be encoded as JSON.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An inbound frame did not match the `{type, topic, event, payload}` shape.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The socket did not open within the configured connect timeout.
    #[error("Timeout: {0}")]
    TimeoutError(String),
}

/// Result type for realtime-link operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationError(err.to_string())
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        RealtimeError::ConfigurationError(format!("Invalid endpoint: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::WebSocketError(err.to_string())
    }
}

impl RealtimeError {
    /// Whether a reconnect attempt could plausibly clear this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RealtimeError::WebSocketError(_) | RealtimeError::TimeoutError(_))
    }
}
