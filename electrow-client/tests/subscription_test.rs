//! Subscription integration tests
//!
//! Push notifications flowing from the channel to session listeners, and
//! listener cleanup on disconnect.

mod common;

use common::{recorder, start_session, MockChannel};
use electrow_client::{HEADERS_EVENT, SCRIPTHASH_EVENT};
use serde_json::json;
use std::time::Duration;

const OUTPOINT_EVENT: &str = "blockchain.outpoint.subscribe";

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_all_only_affects_one_event() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;
    let log = recorder();

    for name in ["a1", "a2"] {
        let log = log.clone();
        session
            .subscribe("event.a", move |_| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(name.to_string());
                }
            })
            .await;
    }
    let b_log = log.clone();
    session
        .subscribe("event.b", move |_| {
            let log = b_log.clone();
            async move {
                log.lock().unwrap().push("b".to_string());
            }
        })
        .await;

    assert_eq!(session.unsubscribe_all("event.a").await, 2);

    assert!(channel.notify("event.a", json!([])));
    assert!(channel.notify("event.b", json!([])));
    settle().await;

    assert_eq!(*log.lock().unwrap(), vec!["b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_listeners_run_in_registration_order() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;
    let log = recorder();

    for name in ["first", "second", "third"] {
        let log = log.clone();
        session
            .subscribe(HEADERS_EVENT, move |params| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{}:{}", name, params[0]["height"]));
                }
            })
            .await;
    }

    assert!(channel.notify(HEADERS_EVENT, json!([{"height": 840000, "hex": "00"}])));
    settle().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first:840000", "second:840000", "third:840000"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_protocol_listeners() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    for event in [HEADERS_EVENT, SCRIPTHASH_EVENT, OUTPOINT_EVENT] {
        session.subscribe(event, |_| async {}).await;
    }
    session.blockchain_headers_subscribe().await.unwrap();

    assert!(channel.drop_connection());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(session.is_connected().await);

    let registry = session.subscriptions();
    assert_eq!(registry.listener_count(HEADERS_EVENT).await, 0);
    assert_eq!(registry.listener_count(SCRIPTHASH_EVENT).await, 0);
    assert_eq!(registry.listener_count(OUTPOINT_EVENT).await, 1);

    // The server-side subscription is not repeated after reconnecting
    assert_eq!(channel.count("blockchain.headers.subscribe"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notifications_resume_on_new_connection() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    assert!(channel.drop_connection());
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let log = recorder();
    let listener_log = log.clone();
    session
        .subscribe(SCRIPTHASH_EVENT, move |params| {
            let log = listener_log.clone();
            async move {
                log.lock().unwrap().push(params[1].to_string());
            }
        })
        .await;

    assert!(channel.notify(SCRIPTHASH_EVENT, json!(["8b01df4e", "c3a1"])));
    settle().await;
    assert_eq!(*log.lock().unwrap(), vec!["\"c3a1\"".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_no_delivery_after_close() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;
    let log = recorder();
    let listener_log = log.clone();
    session
        .subscribe(HEADERS_EVENT, move |_| {
            let log = listener_log.clone();
            async move {
                log.lock().unwrap().push("tip".to_string());
            }
        })
        .await;

    session.close().await;
    assert!(!channel.notify(HEADERS_EVENT, json!([{"height": 1}])));
    settle().await;

    assert!(log.lock().unwrap().is_empty());
}
