//! Session and transport configuration
//!
//! ```rust
//! use electrow_client::{Protocol, SessionConfig, TransportConfig};
//! use std::time::Duration;
//!
//! let transport = TransportConfig::new("electrum.example.org", 50002).with_protocol(Protocol::Tls);
//! assert_eq!(transport.address(), "electrum.example.org:50002");
//!
//! let timings = SessionConfig::default().with_silence_window(Duration::from_secs(30));
//! assert_eq!(timings.probe_timeout, Duration::from_millis(9000));
//! ```

use std::time::Duration;

/// Default wait without calls before a keepalive probe
pub const DEFAULT_SILENCE_WINDOW: Duration = Duration::from_millis(5000);

/// Default time a probe may take before the connection is declared dead
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(9000);

/// Default pause between a detected failure and the policy decision
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Default cap on a single received line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Socket flavour of the built-in channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Plaintext TCP
    #[default]
    Tcp,
    /// TLS over TCP, verified against the webpki root set
    Tls,
}

/// Where and how the built-in channel connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Lines longer than this are a read error that ends the connection
    pub max_line_length: usize,
}

impl TransportConfig {
    /// Plaintext TCP to `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Tcp,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// `host:port` as passed to the socket
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Liveness and reconnect timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Silence after the last call before a probe goes out
    pub silence_window: Duration,
    /// How long a probe may stay unanswered
    pub probe_timeout: Duration,
    /// Delay between a detected failure and reconnecting
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_window: DEFAULT_SILENCE_WINDOW,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl SessionConfig {
    pub fn with_silence_window(mut self, window: Duration) -> Self {
        self.silence_window = window;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Client identity announced by `server.version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeParams {
    pub client_name: String,
    /// Requested protocol version, e.g. `"1.4"`
    pub protocol_version: String,
}

impl HandshakeParams {
    pub fn new(client_name: impl Into<String>, protocol_version: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            protocol_version: protocol_version.into(),
        }
    }
}
