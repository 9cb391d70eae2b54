//! Listener registry for server push notifications
//!
//! Electrum pushes a notification named after the subscribe call that
//! requested it, so the registry is keyed by that exact method string.
//! Listeners are async closures over the notification params. Several
//! listeners may share an event; they run one after another in the order
//! they were registered.
//!
//! Subscribing here only registers a listener. Asking the server for pushes
//! is a separate call (for example `blockchain_headers_subscribe`), and the
//! session does not repeat that call after a reconnect.
//!
//! # Examples
//!
//! ```rust,no_run
//! use electrow_client::ElectrumSession;
//!
//! # async fn example(session: &ElectrumSession) {
//! session.subscribe("blockchain.headers.subscribe", |params| async move {
//!     println!("New tip: {}", params);
//! }).await;
//! # }
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Block header push event
pub const HEADERS_EVENT: &str = "blockchain.headers.subscribe";

/// Script hash status push event
pub const SCRIPTHASH_EVENT: &str = "blockchain.scripthash.subscribe";

/// Events whose listeners are dropped whenever the connection is lost
pub const RESET_ON_DISCONNECT: [&str; 2] = [HEADERS_EVENT, SCRIPTHASH_EVENT];

/// Type-erased listener
pub type ListenerFn = Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Event name to ordered listener list
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    listeners: Arc<Mutex<HashMap<String, Vec<ListenerFn>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`
    pub async fn subscribe<F, Fut>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: ListenerFn = Arc::new(move |params| Box::pin(listener(params)));
        self.listeners
            .lock()
            .await
            .entry(event.into())
            .or_default()
            .push(listener);
    }

    /// Remove every listener for `event`, returning how many were removed
    pub async fn unsubscribe_all(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .await
            .remove(event)
            .map_or(0, |listeners| listeners.len())
    }

    /// Run the listeners of `event` in registration order
    ///
    /// Returns the number of listeners invoked. The lock is released before
    /// any listener runs, so listeners may subscribe or unsubscribe.
    pub async fn dispatch(&self, event: &str, params: Value) -> usize {
        let listeners = match self.listeners.lock().await.get(event) {
            Some(listeners) => listeners.clone(),
            None => {
                tracing::trace!(event = %event, "No listeners for notification");
                return 0;
            }
        };

        for listener in &listeners {
            listener(params.clone()).await;
        }
        listeners.len()
    }

    pub async fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .await
            .get(event)
            .map_or(0, |listeners| listeners.len())
    }

    /// Events that currently have listeners
    pub async fn events(&self) -> Vec<String> {
        self.listeners.lock().await.keys().cloned().collect()
    }
}
