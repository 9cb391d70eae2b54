//! The RPC channel boundary
//!
//! A channel owns one socket at a time: it frames and encodes messages,
//! correlates responses with pending calls and forwards server pushes. The
//! session layer never touches the socket itself; it only opens, closes and
//! calls through this trait.
//!
//! # Events
//!
//! Every successful [`RpcChannel::open`] returns a fresh [`ChannelEvents`]
//! receiver tied to that physical connection. Notifications and the final
//! [`ChannelEvent::Closed`] for a connection arrive on its own receiver only,
//! so an old connection can never report into a newer one. A local
//! [`RpcChannel::close`] drops the sender without emitting `Closed`.

use async_trait::async_trait;
use electrow_core::Result;
use serde_json::Value;
use tokio::sync::mpsc;

/// Receiver of events for one physical connection
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Something the remote side did without being asked
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Server push for a subscribed event
    Notification {
        /// Event name, equal to the subscribe method that produced it
        method: String,
        /// Raw notification params
        params: Value,
    },
    /// The connection ended without a local `close()`
    Closed {
        /// Human-readable cause (EOF, read error, ...)
        reason: String,
    },
}

/// Transport-facing half of the session
///
/// Implementations must be object safe and shareable; the session holds an
/// `Arc<dyn RpcChannel>` and calls into it from several tasks at once.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Open a new physical connection, replacing any previous one
    async fn open(&self) -> Result<ChannelEvents>;

    /// Close the current connection, failing every pending call
    async fn close(&self);

    /// True while a connection is established
    fn is_open(&self) -> bool;

    /// Issue one call and wait for its result
    ///
    /// A failure here belongs to this call only.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Issue one call per entry of `params` in a single batch
    ///
    /// Each request carries `[entry]`, or `[entry, extra]` when `extra` is
    /// given. Results come back in input order; the first server error fails
    /// the whole batch.
    async fn call_batch(
        &self,
        method: &str,
        params: Vec<Value>,
        extra: Option<Value>,
    ) -> Result<Vec<Value>>;
}

/// Positional params for one batch entry
pub fn batch_entry_params(entry: Value, extra: Option<&Value>) -> Vec<Value> {
    match extra {
        Some(extra) => vec![entry, extra.clone()],
        None => vec![entry],
    }
}
