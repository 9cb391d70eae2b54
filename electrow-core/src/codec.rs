//! Line codec for Electrum JSON-RPC messages
//!
//! Electrum frames every message as one JSON document followed by `\n`. The
//! framing itself is done by the transport (a `LinesCodec` in the client);
//! this module turns single lines into typed messages and back.
//!
//! # Batches
//!
//! A batched call is written as one line holding a JSON array of requests,
//! and the server answers with one line holding an array of responses.
//! `decode()` detects arrays and returns them as `JsonRpcMessage::Batch`,
//! with the items left as raw values for the receiver to parse.
//!
//! # Examples
//!
//! ```rust
//! use electrow_core::{codec, Id, JsonRpcRequest};
//!
//! let request = JsonRpcRequest::new("server.ping", vec![], Id::Number(1));
//! let line = codec::encode_request(&request).unwrap();
//! assert!(!line.ends_with('\n'));
//!
//! let decoded = codec::decode(r#"{"jsonrpc":"2.0","result":null,"id":1}"#).unwrap();
//! assert!(decoded.is_response());
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use serde::Serialize;

/// Encode any serializable message to a single-line JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode one received line into a message (single or batch)
///
/// # Errors
///
/// - Malformed JSON: `Error::JsonRpc` with a parse error (-32700)
/// - Empty array: `Error::JsonRpc` with an invalid request error (-32600)
/// - Valid JSON that matches no message shape: parse error
pub fn decode(line: &str) -> Result<JsonRpcMessage> {
    let value: serde_json::Value = serde_json::from_str(line.trim())
        .map_err(|_e| Error::JsonRpc(JsonRpcErrorData::parse_error()))?;

    if let serde_json::Value::Array(items) = value {
        if items.is_empty() {
            return Err(Error::JsonRpc(JsonRpcErrorData::invalid_request(
                "Batch cannot be empty",
            )));
        }
        return Ok(JsonRpcMessage::Batch(items));
    }

    serde_json::from_value(value).map_err(|_e| Error::JsonRpc(JsonRpcErrorData::parse_error()))
}

/// Encode a single request line
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Encode a batch of requests as one array line
pub fn encode_batch(requests: &[JsonRpcRequest]) -> Result<String> {
    if requests.is_empty() {
        return Err(Error::InvalidParams("Batch cannot be empty".to_string()));
    }
    encode(&requests)
}

/// Parse the items of a received batch into responses
///
/// Items that are not responses are dropped; the caller correlates by id and
/// fails whatever stays unanswered.
pub fn decode_batch_responses(items: Vec<serde_json::Value>) -> Vec<JsonRpcResponse> {
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<JsonRpcResponse>(item).ok())
        .collect()
}
