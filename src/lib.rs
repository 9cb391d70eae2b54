//! Electrow - Electrum protocol sessions over JSON-RPC
//!
//! This is the main convenience crate that re-exports the Electrow sub-crates.
//!
//! # Architecture
//!
//! - **electrow-core**: JSON-RPC wire types, line codec, error handling, observability
//! - **electrow-client**: Electrum session with keepalive, reconnection and the protocol facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use electrow::{HandshakeParams, PersistencePolicy, SessionBuilder, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionBuilder::tcp(TransportConfig::new("127.0.0.1", 50001)).build()?;
//!     session
//!         .init_session(
//!             HandshakeParams::new("electrow", "1.4"),
//!             Some(PersistencePolicy::default()),
//!         )
//!         .await?;
//!
//!     let fee = session.blockchain_relayfee().await?;
//!     println!("Relay fee: {}", fee);
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub use electrow_client as client;
pub use electrow_core as core;

pub use electrow_client::{
    ConnectionState, ElectrumSession, HandshakeParams, PersistencePolicy, Protocol, SessionBuilder,
    SessionConfig, TransportConfig,
};
pub use electrow_core::{Error, Result};
