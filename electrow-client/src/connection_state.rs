//! Connection state and persistence bookkeeping
//!
//! The `ConnectionManager` holds what the session knows about its link:
//! the observable [`ConnectionState`], the persistence policy, and the
//! connection epoch.
//!
//! # Connection States
//!
//! ```text
//! Disconnected → Connecting → Connected
//!       ↑                         ↓  (detected failure)
//!       │                    Disconnected → Reconnecting{n} → Connected
//!       │                         ↓  (policy exhausted)
//!       │                       Failed
//!   any state ── close() ──→ Closed
//! ```
//!
//! # Epochs
//!
//! Every physical connection gets a new epoch number. Failure signals carry
//! the epoch they were raised for; the first signal for the current epoch
//! retires it, and any later signal for the same connection is stale. That
//! is how a channel close and a keepalive timeout for the same dead socket
//! result in one reconnect, not two.

use crate::metrics::ClientMetrics;
use crate::policy::{PersistencePolicy, PolicyDecision};
use electrow_core::Error;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

/// Report sent to the session supervisor
#[derive(Debug, Clone)]
pub enum ConnectionSignal {
    /// The connection of `epoch` is unusable
    Lost { epoch: u64, error: Error },
}

/// Where connection losses are reported
///
/// Every loss is queued for the supervisor. The most recent lost epoch is
/// also published, so a handshake still pending on that connection can give
/// up instead of waiting for a reply that will never come.
#[derive(Clone)]
pub struct LossReporter {
    signals: mpsc::UnboundedSender<ConnectionSignal>,
    latest: Arc<watch::Sender<Option<(u64, Error)>>>,
}

impl LossReporter {
    pub fn new(signals: mpsc::UnboundedSender<ConnectionSignal>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            signals,
            latest: Arc::new(latest),
        }
    }

    /// The connection of `epoch` is unusable
    pub fn report(&self, epoch: u64, error: Error) {
        self.latest.send_if_modified(|latest| {
            if matches!(latest, Some((seen, _)) if *seen >= epoch) {
                return false;
            }
            *latest = Some((epoch, error.clone()));
            true
        });
        let _ = self.signals.send(ConnectionSignal::Lost { epoch, error });
    }

    /// Error of the reported loss covering `epoch`, if any
    pub fn loss_of(&self, epoch: u64) -> Option<Error> {
        covering(&self.latest.borrow(), epoch)
    }

    /// Resolves once a loss of `epoch` (or a later one) has been reported
    pub async fn lost(&self, epoch: u64) -> Error {
        let mut latest = self.latest.subscribe();
        let lost = match latest
            .wait_for(|latest| covering(latest, epoch).is_some())
            .await
        {
            Ok(latest) => covering(&latest, epoch).unwrap_or(Error::ConnectionClosed),
            Err(_) => Error::ConnectionClosed,
        };
        lost
    }
}

fn covering(latest: &Option<(u64, Error)>, epoch: u64) -> Option<Error> {
    match latest {
        Some((seen, error)) if *seen >= epoch => Some(error.clone()),
        _ => None,
    }
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, nothing in progress
    Disconnected,
    /// Opening the channel or running the handshake
    Connecting,
    /// Handshake completed
    Connected,
    /// Reconnecting after a detected failure
    Reconnecting { attempt: u32 },
    /// Policy exhausted; no further reconnects will happen
    Failed,
    /// `close()` was called; terminal
    Closed,
}

impl ConnectionState {
    /// Code recorded by the connection state gauge
    pub fn metric_code(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting { .. } => 3,
            ConnectionState::Failed => 4,
            ConnectionState::Closed => 5,
        }
    }

    /// True for states no signal can leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// State, policy and epoch of one session
pub struct ConnectionManager {
    state: RwLock<ConnectionState>,
    policy: Mutex<Option<PersistencePolicy>>,
    epoch: Arc<AtomicU64>,
    attempts: AtomicU32,
    metrics: Option<Arc<ClientMetrics>>,
}

impl ConnectionManager {
    pub fn new(metrics: Option<Arc<ClientMetrics>>) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            policy: Mutex::new(None),
            epoch: Arc::new(AtomicU64::new(0)),
            attempts: AtomicU32::new(0),
            metrics,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Set the state; `Closed` is never left
    pub async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state == ConnectionState::Closed {
            return;
        }
        if *state != new_state {
            tracing::debug!(from = ?*state, to = ?new_state, "Connection state changed");
        }
        *state = new_state;
        if let Some(ref m) = self.metrics {
            m.update_connection_state(new_state.metric_code());
        }
    }

    pub async fn connecting(&self) {
        if !matches!(self.state().await, ConnectionState::Reconnecting { .. }) {
            self.set_state(ConnectionState::Connecting).await;
        }
    }

    /// Handshake done; the reconnect attempt counter restarts
    pub async fn connected(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected).await;
    }

    pub async fn disconnected(&self) {
        self.set_state(ConnectionState::Disconnected).await;
    }

    pub async fn failed(&self) {
        self.set_state(ConnectionState::Failed).await;
    }

    pub async fn closed(&self) {
        self.set_state(ConnectionState::Closed).await;
    }

    /// Replace the policy; `None` means reconnect forever
    pub async fn set_policy(&self, policy: Option<PersistencePolicy>) {
        *self.policy.lock().await = policy;
    }

    /// Remaining retry budget, `None` when no policy is set
    pub async fn remaining_retries(&self) -> Option<u32> {
        self.policy.lock().await.as_ref().map(PersistencePolicy::max_retry)
    }

    /// Consult the policy for one detected failure and update the state
    pub async fn next_action(&self) -> PolicyDecision {
        let decision = match self.policy.lock().await.as_mut() {
            Some(policy) => policy.decide(),
            None => PolicyDecision::Reconnect,
        };

        match decision {
            PolicyDecision::Reconnect => {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.set_state(ConnectionState::Reconnecting { attempt }).await;
            }
            PolicyDecision::InvokeCallback(_) | PolicyDecision::StayClosed => {
                self.failed().await;
            }
        }
        decision
    }

    /// Reconnect attempts since the last successful handshake
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Start a new epoch for a freshly opened connection
    pub fn begin_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Retire `epoch` if it is current; false means the signal is stale
    pub fn retire_epoch(&self, epoch: u64) -> bool {
        self.epoch
            .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Shared epoch counter, read by the keepalive monitor
    pub fn epoch_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.epoch)
    }
}
