//! Error types for electrow
//!
//! Two error shapes travel through the crates:
//!
//! - **Error**: the application-level error every operation returns (uses thiserror)
//! - **JsonRpcErrorData**: the `{code, message, data}` object an Electrum server
//!   puts in the `error` member of a response
//!
//! # Call-level vs connection-level
//!
//! Call-level failures (a server error object, bad arguments, an encoding
//! problem) go back to the caller of that one call and nothing else.
//! Connection-level failures (`Transport`, `Tls`, `ConnectionClosed`,
//! `KeepaliveTimeout`) are also what the session's connection manager reacts
//! to; see [`Error::is_connection_level`].
//!
//! # Examples
//!
//! ```rust
//! use electrow_core::{Error, JsonRpcErrorData};
//!
//! let error = Error::KeepaliveTimeout;
//! assert_eq!(error.to_string(), "keepalive ping timeout");
//! assert!(error.is_connection_level());
//!
//! let server_error = JsonRpcErrorData::new(1, "unknown script hash");
//! assert!(!Error::from(server_error).is_connection_level());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for electrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for electrow operations
///
/// The enum is `Clone` so a single transport failure can be handed to every
/// call that was pending on the dead connection.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The server answered with an error object
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Socket open, read or write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// TLS handshake or server name failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// The channel is not open, or closed while the call was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// A keepalive probe did not settle within the probe timeout
    #[error("keepalive ping timeout")]
    KeepaliveTimeout,

    /// The session was closed and will not be reopened
    #[error("Session closed")]
    SessionClosed,

    /// Arguments rejected before anything was sent
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures that mean the connection itself is unusable
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Tls(_) | Error::ConnectionClosed | Error::KeepaliveTimeout
        )
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::JsonRpc(_) => "json_rpc",
            Error::Serialization(_) => "serialization",
            Error::Transport(_) => "transport",
            Error::Tls(_) => "tls",
            Error::ConnectionClosed => "connection_closed",
            Error::KeepaliveTimeout => "keepalive_timeout",
            Error::SessionClosed => "session_closed",
            Error::InvalidParams(_) => "invalid_params",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Error object carried in the `error` member of a response
///
/// ElectrumX-family servers use small positive codes for application errors
/// (`1` bad request, `2` daemon error) and the reserved negative JSON-RPC
/// codes for protocol errors.
///
/// ```rust
/// use electrow_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::with_data(2, "daemon error", json!({"code": -5}));
/// assert_eq!(error.code, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create a new error object with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new error object with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700): the line was not valid JSON
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// Invalid request (-32600): valid JSON, but not a usable message
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(-32600, msg)
    }

    /// Internal error (-32603)
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
