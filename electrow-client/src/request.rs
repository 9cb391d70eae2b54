//! Pending call table for the TCP channel
//!
//! Each outgoing request gets the next numeric id and a oneshot channel.
//! The reader task completes the oneshot when a response with that id
//! arrives, in whatever order the server answers. When the socket dies,
//! every entry is failed at once so no caller waits forever on a dead
//! connection.

use electrow_core::{Error, Id, JsonRpcResponse, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

type ResponseSender = oneshot::Sender<Result<JsonRpcResponse>>;

/// Correlates responses with pending calls by id
#[derive(Clone)]
pub struct RequestManager {
    pending: Arc<Mutex<HashMap<Id, ResponseSender>>>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next request id; ids are never reused within one channel
    pub fn next_id(&self) -> Id {
        Id::from(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a pending call and get the receiver for its response
    pub async fn register(&self, id: Id) -> oneshot::Receiver<Result<JsonRpcResponse>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Deliver a response; unknown ids are logged and dropped
    pub async fn complete(&self, response: JsonRpcResponse) {
        match self.pending.lock().await.remove(&response.id) {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => {
                tracing::debug!(id = %response.id, "Response for unknown request id");
            }
        }
    }

    /// Fail one pending call
    pub async fn fail(&self, id: &Id, error: Error) {
        if let Some(tx) = self.pending.lock().await.remove(id) {
            let _ = tx.send(Err(error));
        }
    }

    /// Fail every pending call with the same error
    pub async fn fail_all(&self, error: Error) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), error = %error, "Failing pending requests");
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_sequential() {
        let manager = RequestManager::new();
        assert_eq!(manager.next_id(), Id::Number(0));
        assert_eq!(manager.next_id(), Id::Number(1));
        assert_eq!(manager.next_id(), Id::Number(2));
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let manager = RequestManager::new();
        let id = manager.next_id();

        let rx = manager.register(id.clone()).await;
        assert_eq!(manager.pending_count().await, 1);

        manager
            .complete(JsonRpcResponse::success(json!({"confirmed": 10}), id))
            .await;
        assert_eq!(manager.pending_count().await, 0);

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.result, Some(json!({"confirmed": 10})));
    }

    #[tokio::test]
    async fn test_out_of_order_completion() {
        let manager = RequestManager::new();
        let first = manager.next_id();
        let second = manager.next_id();

        let rx1 = manager.register(first.clone()).await;
        let rx2 = manager.register(second.clone()).await;

        manager.complete(JsonRpcResponse::success(json!(2), second)).await;
        manager.complete(JsonRpcResponse::success(json!(1), first)).await;

        assert_eq!(rx1.await.unwrap().unwrap().result, Some(json!(1)));
        assert_eq!(rx2.await.unwrap().unwrap().result, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_unknown_id_ignored() {
        let manager = RequestManager::new();
        let rx = manager.register(Id::Number(1)).await;

        manager
            .complete(JsonRpcResponse::success(json!(null), Id::Number(99)))
            .await;
        assert_eq!(manager.pending_count().await, 1);
        drop(rx);
    }

    #[tokio::test]
    async fn test_fail_request() {
        let manager = RequestManager::new();
        let rx = manager.register(Id::Number(1)).await;

        manager
            .fail(&Id::Number(1), Error::Transport("broken pipe".into()))
            .await;

        assert!(matches!(rx.await.unwrap(), Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let manager = RequestManager::new();

        let rx1 = manager.register(Id::Number(1)).await;
        let rx2 = manager.register(Id::Number(2)).await;

        manager.fail_all(Error::ConnectionClosed).await;

        assert_eq!(manager.pending_count().await, 0);
        assert!(matches!(rx1.await.unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(rx2.await.unwrap(), Err(Error::ConnectionClosed)));
    }
}
