//! JSON-RPC 2.0 message types as spoken by Electrum servers
//!
//! Electrum is JSON-RPC 2.0 with two house rules:
//!
//! - **Positional params only**: every request carries a `params` array, even
//!   when it is empty. Several server implementations reject a request whose
//!   `params` member is missing.
//! - **Subscriptions push notifications named after the method**: after a
//!   successful `blockchain.headers.subscribe`, the server pushes
//!   notifications whose `method` is `blockchain.headers.subscribe`.
//!
//! # Message Types
//!
//! 1. **Request**: client to server call, answered by a response with the same id
//! 2. **Response**: the result (or error object) for one request
//! 3. **Notification**: server push, no id, no answer expected
//! 4. **Batch**: an array of responses answering a batched request array

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use std::fmt;

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// JSON-RPC 2.0 request ID
///
/// The client only ever issues numeric ids, but servers echo whatever they
/// were sent and answer unparseable input with a `null` id, so all three
/// shapes are accepted on the way in.
///
/// ```rust
/// use electrow_core::Id;
///
/// let id: Id = 42u64.into();
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
    /// Null identifier, used by servers for responses to unparseable input
    Null,
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

/// Request sent to the server
///
/// ```rust
/// use electrow_core::{Id, JsonRpcRequest};
/// use serde_json::json;
///
/// let req = JsonRpcRequest::new("server.version", vec![json!("electrow"), json!("1.4")], Id::Number(0));
/// let line = serde_json::to_string(&req).unwrap();
/// assert!(line.contains(r#""params":["electrow","1.4"]"#));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, always "2.0"
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Remote method name, e.g. `blockchain.scripthash.get_balance`
    pub method: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    /// Correlation id
    pub id: Id,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>, id: Id) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Server push message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Event name; equals the subscribe method that produced it
    pub method: String,
    /// Payload, usually an array
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
        }
    }
}

/// Response to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    pub id: Id,
}

impl JsonRpcResponse {
    pub fn success(result: serde_json::Value, id: Id) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the result value or the server's error object
    ///
    /// A response with neither member is a successful `null` result: servers
    /// answer `blockchain.scripthash.subscribe` for an unused script hash
    /// with `"result": null`, which deserializes to a missing member.
    pub fn into_result(self) -> std::result::Result<serde_json::Value, JsonRpcErrorData> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Any single line received from a server
///
/// `#[serde(untagged)]` tries the variants in order: a request needs both
/// `method` and `id`, a notification needs `method`, a response needs `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    /// Raw batch items, parsed individually by the receiver
    Batch(Vec<serde_json::Value>),
}

impl JsonRpcMessage {
    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, JsonRpcMessage::Batch(_))
    }
}
