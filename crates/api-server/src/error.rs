//! Error types for the relay gateway

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport to a mod endpoint could not be established
    #[error("failed to connect to mod on port {port}: {message}")]
    Connection { port: u16, message: String },

    /// Operation on a port with no live mod connection
    #[error("port {port} is not attached")]
    NotAttached { port: u16 },

    /// Every socket streaming candidate failed
    #[error("no LM streaming endpoint accepted the request")]
    StreamTransportExhausted,

    /// The HTTP generation fallback failed
    #[error("{0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn connection(port: u16, message: impl ToString) -> Self {
        Self::Connection {
            port,
            message: message.to_string(),
        }
    }

    pub fn upstream(message: impl ToString) -> Self {
        Self::Upstream(message.to_string())
    }

    /// HTTP status used when the error reaches a route handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAttached { .. } => StatusCode::BAD_REQUEST,
            Self::Connection { .. }
            | Self::StreamTransportExhausted
            | Self::Upstream(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
