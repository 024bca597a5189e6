//! Client error taxonomy.
//!
//! Every failure a caller can observe falls into one of the `ClientError`
//! variants. Errors are `Clone` because a single connection loss is fanned out
//! to every pending call and subscription at once.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error reported by the node in the `error` field of a response.
///
/// Nodes are not consistent about the shape of this field, so anything that is
/// not a `{code, message, data}` object is kept verbatim in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code, when the node supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Human-readable message
    pub message: String,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Create a new RPC error
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build from the raw `error` field of a response envelope.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value::<RpcError>(value.clone()) {
            Ok(error) => error,
            Err(_) => match value {
                serde_json::Value::String(message) => Self::new(None, message),
                other => Self {
                    code: None,
                    message: other.to_string(),
                    data: Some(other),
                },
            },
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RpcError {}

/// Errors surfaced by the node client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// Socket could not be opened, a send could not be enqueued, or the
    /// connection dropped underneath an operation
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected message shape, failed upgrade handshake,
    /// invalid close code
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The node answered with an `error` field
    #[error("rpc error: {0}")]
    Rpc(RpcError),

    /// A caller-imposed or discovery-attempt deadline elapsed
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The connection failed recently and is still inside its cool-down
    #[error("connection failed, cooling down for another {remaining_ms}ms")]
    CoolingDown {
        /// Time left before a fresh connect is allowed
        remaining_ms: u64,
    },

    /// The operation was cancelled before it produced a result
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Transport error helper
    pub fn transport(details: impl fmt::Display) -> Self {
        Self::Transport(details.to_string())
    }

    /// Protocol error helper
    pub fn protocol(details: impl fmt::Display) -> Self {
        Self::Protocol(details.to_string())
    }

    /// True for failures that come from the connection rather than the
    /// individual request.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::CoolingDown { .. })
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Protocol(format!("invalid json: {}", e))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::Protocol(p) => ClientError::Protocol(p.to_string()),
            WsError::Utf8 => ClientError::Protocol("invalid utf-8 in text frame".into()),
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<native_tls::Error> for ClientError {
    fn from(e: native_tls::Error) -> Self {
        ClientError::Transport(format!("tls: {}", e))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
