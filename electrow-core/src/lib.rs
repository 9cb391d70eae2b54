//! Core types, line codec and errors for electrow
//!
//! This crate holds everything that is independent of a live connection:
//!
//! - **Types**: JSON-RPC 2.0 messages in the shape Electrum servers use
//! - **Codec**: one-message-per-line encoding and decoding
//! - **Error handling**: the crate-wide `Error` and `Result`
//! - **Observability**: tracing subscriber and OpenTelemetry pipeline setup
//!
//! The session layer lives in `electrow-client`.
//!
//! # Example
//!
//! ```rust
//! use electrow_core::{codec, Id, JsonRpcMessage, JsonRpcRequest};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     "blockchain.scripthash.get_balance",
//!     vec![json!("8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161")],
//!     Id::Number(1),
//! );
//! let line = codec::encode_request(&request).unwrap();
//! assert!(line.starts_with('{'));
//!
//! let reply = codec::decode(r#"{"jsonrpc":"2.0","result":{"confirmed":0,"unconfirmed":0},"id":1}"#).unwrap();
//! assert!(matches!(reply, JsonRpcMessage::Response(_)));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
