//! Session lifecycle integration tests
//!
//! Init, handshake, call stamping and terminal close, against a mock channel
//! under paused time.

mod common;

use common::{start_session, MockChannel};
use electrow_client::{
    ConnectionState, ElectrumSession, HandshakeParams, PersistencePolicy, RpcChannel,
    SessionConfig,
};
use electrow_core::Error;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_init_session_runs_handshake() {
    let channel = MockChannel::new();
    let session = ElectrumSession::new(channel.clone());

    let result = session
        .init_session(HandshakeParams::new("electrow-test", "1.4"), None)
        .await
        .unwrap();

    assert_eq!(result, json!(["MockElectrum 1.0", "1.4"]));
    assert_eq!(
        channel.calls_to("server.version"),
        vec![vec![json!("electrow-test"), json!("1.4")]]
    );
    assert_eq!(session.protocol_version().await, Some("1.4".to_string()));
    assert_eq!(session.state().await, ConnectionState::Connected);
    assert!(session.is_connected().await);
    assert_eq!(channel.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_accepts_bare_version_string() {
    let channel = MockChannel::with_server_version(json!("1.5"));
    let session = start_session(&channel, None).await;

    assert_eq!(session.protocol_version().await, Some("1.5".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_initial_open_failure_is_not_retried() {
    let channel = MockChannel::new();
    channel.fail_next_opens(1);
    let session = ElectrumSession::new(channel.clone());

    let result = session
        .init_session(HandshakeParams::new("electrow-test", "1.4"), None)
        .await;
    assert!(matches!(result, Err(Error::Transport(_))));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(channel.opens(), 1);
    assert_eq!(session.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_rejection_closes_channel() {
    let channel = MockChannel::new();
    channel.fail("server.version");
    let session = ElectrumSession::new(channel.clone());

    let result = session
        .init_session(HandshakeParams::new("electrow-test", "1.4"), None)
        .await;
    assert!(matches!(result, Err(Error::JsonRpc(_))));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(channel.opens(), 1);
    assert_eq!(session.state().await, ConnectionState::Disconnected);
    assert_eq!(session.protocol_version().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_time_last_call_increases_with_each_call() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    let mut previous = session.time_last_call().unwrap();
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.blockchain_relayfee().await.unwrap();

        let current = session.time_last_call().unwrap();
        assert!(current > previous);
        previous = current;
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_call_returns_its_own_error() {
    let channel = MockChannel::new();
    channel.fail("blockchain.transaction.broadcast");
    let session = start_session(&channel, None).await;

    let result = session.blockchain_transaction_broadcast("0100").await;
    assert!(matches!(result, Err(Error::JsonRpc(ref e)) if e.code == -32603));

    // A call-level failure is not a connection failure
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.opens(), 1);
    assert!(session.is_connected().await);
    assert!(session.blockchain_relayfee().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent_and_terminal() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    session.close().await;
    session.close().await;

    assert!(session.is_closed());
    assert_eq!(session.state().await, ConnectionState::Closed);
    assert!(!session.is_keepalive_armed());

    let reinit = session
        .init_session(HandshakeParams::new("electrow-test", "1.4"), None)
        .await;
    assert!(matches!(reinit, Err(Error::SessionClosed)));
    assert!(session.blockchain_relayfee().await.is_err());
    assert_eq!(channel.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_silences_pending_keepalive() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    session.blockchain_relayfee().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(session.is_keepalive_armed());

    session.close().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(channel.count("server.ping"), 0);
    assert_eq!(channel.opens(), 1);
    assert_eq!(session.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_probe() {
    let channel = MockChannel::new();
    channel.hang_pings();
    let session = start_session(&channel, None).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(channel.count("server.ping"), 1);

    session.close().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(channel.count("server.ping"), 1);
    assert_eq!(channel.opens(), 1);
    assert_eq!(session.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_settle_delay() {
    let channel = MockChannel::new();
    let session = start_session(&channel, Some(PersistencePolicy::default())).await;

    assert!(channel.drop_connection());
    tokio::time::sleep(Duration::from_millis(500)).await;
    session.close().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(channel.opens(), 1);
    assert_eq!(session.state().await, ConnectionState::Closed);
    assert_eq!(session.remaining_retries().await, Some(1000));
}

#[tokio::test(start_paused = true)]
async fn test_init_session_with_config() {
    let channel = MockChannel::new();
    let session = ElectrumSession::new(channel.clone());
    let config = SessionConfig::default()
        .with_silence_window(Duration::from_secs(1))
        .with_probe_timeout(Duration::from_secs(2))
        .with_settle_delay(Duration::from_millis(100));

    session
        .init_session_with_config(HandshakeParams::new("electrow-test", "1.4"), None, config)
        .await
        .unwrap();
    assert_eq!(session.config().await, config);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(channel.count("server.ping"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_initial_handshake_fails_after_probe() {
    let channel = MockChannel::new();
    channel.hang("server.version");
    channel.hang_pings();
    let session = ElectrumSession::new(channel.clone());

    let started = tokio::time::Instant::now();
    let result = session
        .init_session(HandshakeParams::new("electrow-test", "1.4"), None)
        .await;
    assert!(matches!(result, Err(Error::KeepaliveTimeout)));

    // 5 s silence window plus the 9 s probe timeout
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(14));
    assert!(elapsed < Duration::from_secs(15));
    assert_eq!(channel.count("server.ping"), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(channel.opens(), 1);
    assert!(!channel.is_open());
    assert_eq!(session.state().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_stops_probing() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;
    session.blockchain_relayfee().await.unwrap();
    assert!(session.is_keepalive_armed());

    drop(session);
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(channel.count("server.ping"), 0);
    assert!(!channel.is_open());
    assert_eq!(channel.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_clone_keeps_session_alive() {
    let channel = MockChannel::new();
    let session = start_session(&channel, None).await;

    drop(session.clone());
    tokio::time::sleep(Duration::from_millis(5100)).await;

    assert_eq!(channel.count("server.ping"), 1);
    assert!(channel.is_open());
    assert!(session.is_connected().await);
}
