//! Electrum protocol session client
//!
//! This crate keeps one logical session with an Electrum server alive over
//! an unreliable socket. Individual calls are plain JSON-RPC; the work is in
//! the connection lifecycle around them.
//!
//! # Core Features
//!
//! - **TCP/TLS Transport**: line-delimited JSON-RPC over a long-lived socket
//! - **Keepalive**: a `server.ping` probe after a silent window, with its own timeout
//! - **Auto-Reconnection**: bounded, unbounded or callback-terminated persistence policies
//! - **Subscriptions**: listeners for server push notifications, by event name
//! - **Batch Calls**: one method applied to many parameter entries
//! - **Protocol Facade**: typed wrappers for `server.*`, `blockchain.*` and `mempool.*`
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use electrow_client::{HandshakeParams, SessionBuilder, TransportConfig, HEADERS_EVENT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionBuilder::tcp(TransportConfig::new("127.0.0.1", 50001)).build()?;
//!
//!     // No policy: reconnect after every failure, forever
//!     let version = session
//!         .init_session(HandshakeParams::new("electrow", "1.4"), None)
//!         .await?;
//!     println!("Server: {}", version);
//!
//!     session.subscribe(HEADERS_EVENT, |params| async move {
//!         println!("New tip: {}", params);
//!     }).await;
//!     session.blockchain_headers_subscribe().await?;
//!
//!     let balance = session
//!         .blockchain_scripthash_get_balance("8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161")
//!         .await?;
//!     println!("Balance: {}", balance);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Bounded Reconnection
//!
//! ```rust,no_run
//! use electrow_client::{HandshakeParams, PersistencePolicy, SessionBuilder, TransportConfig};
//!
//! # async fn example() -> electrow_core::Result<()> {
//! let session = SessionBuilder::tcp(TransportConfig::new("127.0.0.1", 50001)).build()?;
//!
//! let policy = PersistencePolicy::new(10).with_callback(|| {
//!     eprintln!("Electrum server unreachable, giving up");
//! });
//! session
//!     .init_session(HandshakeParams::new("electrow", "1.4"), Some(policy))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Listeners for [`HEADERS_EVENT`] and [`SCRIPTHASH_EVENT`] are dropped on
//! every detected disconnect and are not restored; subscribe again once
//! [`ElectrumSession::is_connected`] reports the new connection.

mod channel;
mod client_builder;
mod config;
mod connection_state;
mod dispatcher;
mod facade;
mod keepalive;
mod metrics;
mod policy;
mod request;
mod session;
mod subscription;
mod tcp;

pub use channel::{batch_entry_params, ChannelEvent, ChannelEvents, RpcChannel};
pub use client_builder::SessionBuilder;
pub use config::{
    HandshakeParams, Protocol, SessionConfig, TransportConfig, DEFAULT_MAX_LINE_LENGTH,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_SETTLE_DELAY, DEFAULT_SILENCE_WINDOW,
};
pub use connection_state::ConnectionState;
pub use facade::HISTORY_RANGE_VERSION;
pub use keepalive::PING_METHOD;
pub use metrics::ClientMetrics;
pub use policy::{PersistencePolicy, PolicyCallback, PolicyDecision, DEFAULT_MAX_RETRY};
pub use request::RequestManager;
pub use session::{ElectrumSession, HANDSHAKE_METHOD};
pub use subscription::{SubscriptionRegistry, HEADERS_EVENT, RESET_ON_DISCONNECT, SCRIPTHASH_EVENT};
pub use tcp::TcpChannel;
