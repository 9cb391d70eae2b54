//! Electrum session
//!
//! `ElectrumSession` is one logical connection to an Electrum server that
//! may span many physical connections. It wires together:
//!
//! - the [`RpcChannel`] that owns the socket,
//! - the [`RequestDispatcher`] every call goes through,
//! - the [`KeepaliveMonitor`] probing silent connections,
//! - the [`ConnectionManager`] holding state, policy and epochs,
//! - the [`SubscriptionRegistry`] fed by server pushes.
//!
//! # Lifecycle
//!
//! 1. **Init**: `init_session` stores the handshake parameters and the
//!    persistence policy, opens the channel and runs `server.version`.
//! 2. **Supervise**: a background task receives connection-loss signals from
//!    the channel (socket closed) and from the keepalive monitor (probe
//!    timeout). For each loss it drops the header and script hash listeners,
//!    waits the settle delay, then lets the policy choose between
//!    reconnecting, running the exhaustion callback, or staying closed.
//! 3. **Close**: `close()` is terminal. Timers are cancelled, the supervisor
//!    stops and the channel is closed; nothing reconnects afterwards.
//!
//! # Cloning
//!
//! `ElectrumSession` is cheaply cloneable; all clones share one session.
//!
//! # Examples
//!
//! ```rust,no_run
//! use electrow_client::{HandshakeParams, PersistencePolicy, SessionBuilder, TransportConfig};
//!
//! # async fn example() -> electrow_core::Result<()> {
//! let session = SessionBuilder::tcp(TransportConfig::new("127.0.0.1", 50001)).build()?;
//! session
//!     .init_session(HandshakeParams::new("electrow", "1.4"), Some(PersistencePolicy::default()))
//!     .await?;
//!
//! let tip = session.blockchain_headers_subscribe().await?;
//! println!("Tip: {}", tip);
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

use crate::channel::{ChannelEvent, ChannelEvents, RpcChannel};
use crate::config::{HandshakeParams, SessionConfig};
use crate::connection_state::{
    ConnectionManager, ConnectionSignal, ConnectionState, LossReporter,
};
use crate::dispatcher::RequestDispatcher;
use crate::keepalive::KeepaliveMonitor;
use crate::metrics::ClientMetrics;
use crate::policy::{PersistencePolicy, PolicyDecision};
use crate::subscription::{SubscriptionRegistry, RESET_ON_DISCONNECT};
use electrow_core::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handshake method announcing client name and protocol version
pub const HANDSHAKE_METHOD: &str = "server.version";

struct SessionInner {
    channel: Arc<dyn RpcChannel>,
    dispatcher: RequestDispatcher,
    keepalive: Arc<KeepaliveMonitor>,
    subscriptions: SubscriptionRegistry,
    connection: ConnectionManager,
    config: RwLock<SessionConfig>,
    handshake: RwLock<Option<HandshakeParams>>,
    protocol_version: RwLock<Option<String>>,
    losses: LossReporter,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionSignal>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
    /// Epoch whose handshake is in flight, 0 when none
    handshaking: AtomicU64,
    metrics: Option<Arc<ClientMetrics>>,
}

/// One logical Electrum connection with keepalive and reconnection
#[derive(Clone)]
pub struct ElectrumSession {
    inner: Arc<SessionInner>,
}

impl ElectrumSession {
    /// Session over `channel` with default timings and no metrics
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self::from_parts(channel, SessionConfig::default(), None)
    }

    pub(crate) fn from_parts(
        channel: Arc<dyn RpcChannel>,
        config: SessionConfig,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let losses = LossReporter::new(signals);
        let connection = ConnectionManager::new(metrics.clone());
        let keepalive = Arc::new(KeepaliveMonitor::new(
            config,
            connection.epoch_counter(),
            losses.clone(),
            metrics.clone(),
        ));
        let dispatcher =
            RequestDispatcher::new(Arc::clone(&channel), Arc::clone(&keepalive), metrics.clone());

        Self {
            inner: Arc::new(SessionInner {
                channel,
                dispatcher,
                keepalive,
                subscriptions: SubscriptionRegistry::new(),
                connection,
                config: RwLock::new(config),
                handshake: RwLock::new(None),
                protocol_version: RwLock::new(None),
                losses,
                signal_rx: Mutex::new(Some(signal_rx)),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
                handshaking: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    /// Connect and run the handshake
    ///
    /// `policy` decides what happens after later connection failures;
    /// `None` reconnects forever. A failure of this first connect is
    /// returned and not retried.
    #[tracing::instrument(
        skip(self, handshake, policy),
        fields(client = %handshake.client_name, version = %handshake.protocol_version)
    )]
    pub async fn init_session(
        &self,
        handshake: HandshakeParams,
        policy: Option<PersistencePolicy>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        *self.inner.handshake.write().await = Some(handshake.clone());
        self.inner.connection.set_policy(policy).await;
        self.inner.dispatcher.reset_last_call();
        self.ensure_supervisor().await;

        self.connect_and_handshake(&handshake).await
    }

    /// `init_session` with replacement timings
    pub async fn init_session_with_config(
        &self,
        handshake: HandshakeParams,
        policy: Option<PersistencePolicy>,
        config: SessionConfig,
    ) -> Result<Value> {
        *self.inner.config.write().await = config;
        self.inner.keepalive.set_config(config);
        self.init_session(handshake, policy).await
    }

    /// Close for good; later calls are no-ops
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Closing session");
        self.inner.keepalive.disable();
        self.inner.shutdown.cancel();
        self.inner.connection.closed().await;
        self.inner.channel.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Listen for pushes named `event`
    pub async fn subscribe<F, Fut>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.subscriptions.subscribe(event, listener).await;
    }

    /// Drop every listener of `event`
    pub async fn unsubscribe_all(&self, event: &str) -> usize {
        self.inner.subscriptions.unsubscribe_all(event).await
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.connection.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Protocol version the server agreed to in the last handshake
    pub async fn protocol_version(&self) -> Option<String> {
        self.inner.protocol_version.read().await.clone()
    }

    /// True while the keepalive idle timer is pending
    pub fn is_keepalive_armed(&self) -> bool {
        self.inner.keepalive.is_armed()
    }

    /// Start of the most recent call
    pub fn time_last_call(&self) -> Option<Instant> {
        self.inner.dispatcher.time_last_call()
    }

    pub async fn config(&self) -> SessionConfig {
        *self.inner.config.read().await
    }

    /// Reconnects left in the policy budget, `None` without a policy
    pub async fn remaining_retries(&self) -> Option<u32> {
        self.inner.connection.remaining_retries().await
    }

    /// Raw call through the dispatcher
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.inner.dispatcher.request(method, params).await
    }

    /// Raw batch call through the dispatcher
    pub async fn request_batch(
        &self,
        method: &str,
        params: Vec<Value>,
        extra: Option<Value>,
    ) -> Result<Vec<Value>> {
        self.inner
            .dispatcher
            .request_batch(method, params, extra)
            .await
    }

    async fn ensure_supervisor(&self) {
        if let Some(signals) = self.inner.signal_rx.lock().await.take() {
            tokio::spawn(supervise(
                Arc::downgrade(&self.inner),
                signals,
                self.inner.shutdown.clone(),
            ));
        }
    }

    async fn connect_and_handshake(&self, handshake: &HandshakeParams) -> Result<Value> {
        self.inner.keepalive.disarm();
        self.inner.connection.connecting().await;

        let events = match self.inner.channel.open().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open channel");
                self.inner.connection.disconnected().await;
                return Err(e);
            }
        };
        if self.is_closed() {
            self.inner.channel.close().await;
            return Err(Error::SessionClosed);
        }

        let epoch = self.inner.connection.begin_epoch();
        self.spawn_event_pump(events, epoch);
        self.inner.keepalive.resume();
        self.inner.keepalive.arm(self.inner.dispatcher.clone());

        let params = vec![
            Value::from(handshake.client_name.as_str()),
            Value::from(handshake.protocol_version.as_str()),
        ];
        self.inner.handshaking.store(epoch, Ordering::SeqCst);
        let outcome = tokio::select! {
            outcome = self.inner.dispatcher.request(HANDSHAKE_METHOD, params) => outcome,
            error = self.inner.losses.lost(epoch) => Err(error),
        };
        self.inner.handshaking.store(0, Ordering::SeqCst);

        let outcome = match (outcome, self.inner.losses.loss_of(epoch)) {
            (Ok(_), Some(error)) => Err(error),
            (outcome, _) => outcome,
        };
        match outcome {
            Ok(result) => {
                let negotiated = negotiated_version(&result);
                *self.inner.protocol_version.write().await = negotiated.clone();
                self.inner.connection.connected().await;
                tracing::info!(epoch, protocol_version = ?negotiated, "Session established");
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(epoch, error = %e, "Handshake failed");
                // The supervisor tears down a connection it retired first
                if self.inner.connection.retire_epoch(epoch) {
                    self.inner.keepalive.disarm();
                    self.inner.channel.close().await;
                    self.inner.connection.disconnected().await;
                }
                Err(e)
            }
        }
    }

    /// Forward pushes of one connection to the registry, and its end to the supervisor
    fn spawn_event_pump(&self, mut events: ChannelEvents, epoch: u64) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    ChannelEvent::Notification { method, params } => {
                        tracing::debug!(epoch, event = %method, "Notification received");
                        if let Some(ref m) = inner.metrics {
                            m.record_notification(&method);
                        }
                        inner.subscriptions.dispatch(&method, params).await;
                    }
                    ChannelEvent::Closed { reason } => {
                        inner.losses.report(epoch, Error::Transport(reason));
                        break;
                    }
                }
            }
        });
    }

    async fn handle_signal(&self, signal: ConnectionSignal) {
        let ConnectionSignal::Lost { epoch, error } = signal;
        if self.is_closed() || self.state().await.is_terminal() {
            return;
        }
        if self.inner.handshaking.load(Ordering::SeqCst) == epoch {
            tracing::debug!(epoch, error = %error, "Connection lost during handshake");
            return;
        }
        if !self.inner.connection.retire_epoch(epoch) {
            tracing::debug!(
                epoch,
                current = self.inner.connection.current_epoch(),
                error = %error,
                "Ignoring stale connection signal"
            );
            return;
        }

        tracing::warn!(epoch, error = %error, "Connection lost");
        if let Some(ref m) = self.inner.metrics {
            m.record_error(error.kind());
        }

        loop {
            self.teardown().await;

            let settle_delay = self.inner.config.read().await.settle_delay;
            tokio::time::sleep(settle_delay).await;
            if self.is_closed() || self.is_abandoned() {
                return;
            }

            match self.inner.connection.next_action().await {
                PolicyDecision::Reconnect => {
                    let attempt = self.inner.connection.attempts();
                    tracing::info!(attempt, "Reconnecting");
                    if let Some(ref m) = self.inner.metrics {
                        m.record_reconnection_attempt();
                    }

                    match self.reconnect().await {
                        Ok(_) => {
                            if let Some(ref m) = self.inner.metrics {
                                m.record_reconnection_success();
                            }
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(attempt, error = %e, "Reconnect failed");
                        }
                    }
                }
                PolicyDecision::InvokeCallback(callback) => {
                    tracing::info!("Persistence policy exhausted, invoking callback");
                    callback();
                    return;
                }
                PolicyDecision::StayClosed => {
                    tracing::info!("Persistence policy exhausted, staying closed");
                    return;
                }
            }
        }
    }

    /// Drop the dead connection and the listeners tied to it
    async fn teardown(&self) {
        self.inner.connection.disconnected().await;
        self.inner.keepalive.disarm();
        self.inner.channel.close().await;
        for event in RESET_ON_DISCONNECT {
            let removed = self.inner.subscriptions.unsubscribe_all(event).await;
            if removed > 0 {
                tracing::debug!(event = %event, removed, "Cleared listeners");
            }
        }
    }

    /// Every user handle is gone; only the supervisor still holds the session
    fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    async fn reconnect(&self) -> Result<Value> {
        let handshake = self
            .inner
            .handshake
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Internal("reconnect before init_session".to_string()))?;

        self.inner.dispatcher.reset_last_call();
        self.connect_and_handshake(&handshake).await
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.keepalive.disable();
        self.shutdown.cancel();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!("Session dropped without close");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.channel);
            runtime.spawn(async move { channel.close().await });
        }
    }
}

async fn supervise(
    weak: Weak<SessionInner>,
    mut signals: mpsc::UnboundedReceiver<ConnectionSignal>,
    shutdown: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        let Some(inner) = weak.upgrade() else { break };
        let session = ElectrumSession { inner };
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = session.handle_signal(signal) => {}
        }
    }
    tracing::debug!("Session supervisor stopped");
}

/// Version the server agreed to: the second element of `[software, version]`
fn negotiated_version(result: &Value) -> Option<String> {
    match result {
        Value::Array(items) => items.get(1).and_then(Value::as_str).map(str::to_string),
        Value::String(version) => Some(version.clone()),
        _ => None,
    }
}
