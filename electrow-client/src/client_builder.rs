//! Session builder
//!
//! The `SessionBuilder` configures a session before it is built:
//! - the channel it runs over (any [`RpcChannel`], or the built-in TCP/TLS one)
//! - keepalive and reconnect timings
//! - observability (OpenTelemetry) and the service name used for telemetry
//!
//! Building does not connect; call
//! [`init_session`](crate::ElectrumSession::init_session) afterwards.
//!
//! # Examples
//!
//! ```rust,no_run
//! use electrow_client::{Protocol, SessionBuilder, SessionConfig, TransportConfig};
//! use std::time::Duration;
//!
//! # fn example() -> electrow_core::Result<()> {
//! let transport = TransportConfig::new("electrum.example.org", 50002).with_protocol(Protocol::Tls);
//!
//! let session = SessionBuilder::tcp(transport)
//!     .with_config(SessionConfig::default().with_silence_window(Duration::from_secs(10)))
//!     .with_default_observability()
//!     .service_name("wallet-sync")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::channel::RpcChannel;
use crate::config::{SessionConfig, TransportConfig};
use crate::metrics::ClientMetrics;
use crate::session::ElectrumSession;
use crate::tcp::TcpChannel;
use electrow_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for an [`ElectrumSession`]
pub struct SessionBuilder {
    channel: Arc<dyn RpcChannel>,
    config: SessionConfig,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl SessionBuilder {
    /// Session over a caller-supplied channel
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self {
            channel,
            config: SessionConfig::default(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Session over the built-in line-delimited TCP/TLS channel
    pub fn tcp(transport: TransportConfig) -> Self {
        Self::new(Arc::new(TcpChannel::new(transport)))
    }

    /// Keepalive and reconnect timings
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name for telemetry, used when observability is enabled
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ElectrumSession> {
        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }

                electrow_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;

                Some(Arc::new(ClientMetrics::new(config.service_name)))
            }
            None => None,
        };

        Ok(ElectrumSession::from_parts(self.channel, self.config, metrics))
    }
}
