//! Keepalive monitor
//!
//! Detects connections that look open but no longer answer. Two timers, at
//! most one of each at any instant:
//!
//! - the **idle timer**, armed when a connection opens and re-armed after
//!   every successful call, fires when the silence window has passed;
//! - the **probe timer** bounds a `server.ping` issued on idle expiry.
//!
//! ```text
//!   arm ──▶ Idle-armed ──(silence window, no call since)──▶ Probing
//!              ▲   │                                          │
//!              │   └─(call still outstanding: wait again)     │
//!              └──────────── ping answered ◀──────────────────┤
//!                            ping rejected: logged only ◀─────┤
//!                 probe timeout: ConnectionSignal::Lost ◀─────┘
//! ```
//!
//! The ping goes through the request dispatcher like any other call, so an
//! answered ping re-arms the idle timer by itself.
//!
//! Between a detected failure and the next successful connection the
//! monitor is suspended and `arm()` does nothing. After `disable()` it never
//! arms again.
//!
//! Timer slots sit behind `std::sync::Mutex` and every method that touches
//! them is synchronous, so arming from inside a completing call never waits.

use crate::config::SessionConfig;
use crate::connection_state::LossReporter;
use crate::dispatcher::RequestDispatcher;
use crate::metrics::ClientMetrics;
use electrow_core::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Liveness probe method
pub const PING_METHOD: &str = "server.ping";

type TimerSlot = Mutex<Option<JoinHandle<()>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct KeepaliveMonitor {
    config: Mutex<SessionConfig>,
    idle_timer: TimerSlot,
    probe_timer: TimerSlot,
    probing: AtomicBool,
    suspended: AtomicBool,
    disabled: AtomicBool,
    epoch: Arc<AtomicU64>,
    losses: LossReporter,
    metrics: Option<Arc<ClientMetrics>>,
}

impl KeepaliveMonitor {
    pub fn new(
        config: SessionConfig,
        epoch: Arc<AtomicU64>,
        losses: LossReporter,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            idle_timer: Mutex::new(None),
            probe_timer: Mutex::new(None),
            probing: AtomicBool::new(false),
            suspended: AtomicBool::new(true),
            disabled: AtomicBool::new(false),
            epoch,
            losses,
            metrics,
        }
    }

    /// New timings apply from the next arm
    pub fn set_config(&self, config: SessionConfig) {
        *lock(&self.config) = config;
    }

    fn silence_window(&self) -> Duration {
        lock(&self.config).silence_window
    }

    fn inactive(&self) -> bool {
        self.disabled.load(Ordering::SeqCst) || self.suspended.load(Ordering::SeqCst)
    }

    /// Restart the idle timer, cancelling the previous one
    pub fn arm(self: &Arc<Self>, dispatcher: RequestDispatcher) {
        if self.inactive() {
            return;
        }

        let window = self.silence_window();
        let monitor = Arc::clone(self);
        let mut idle_timer = lock(&self.idle_timer);
        if let Some(previous) = idle_timer.take() {
            previous.abort();
        }
        *idle_timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(window).await;
                if !monitor.on_silence(&dispatcher) {
                    break;
                }
            }
        }));
    }

    /// Idle expiry; returns true to wait another window
    fn on_silence(self: &Arc<Self>, dispatcher: &RequestDispatcher) -> bool {
        if self.inactive() {
            return false;
        }
        if self.is_probing() {
            tracing::debug!("Keepalive probe already in flight");
            return false;
        }

        match dispatcher.time_last_call() {
            Some(last) if Instant::now().duration_since(last) >= self.silence_window() => {
                self.start_probe(dispatcher.clone());
                false
            }
            // A call started inside the window has not completed yet
            Some(_) => true,
            None => false,
        }
    }

    fn start_probe(self: &Arc<Self>, dispatcher: RequestDispatcher) {
        let probe_timeout = lock(&self.config).probe_timeout;
        let epoch = self.epoch.load(Ordering::SeqCst);

        self.probing.store(true, Ordering::SeqCst);
        if let Some(ref m) = self.metrics {
            m.record_keepalive_probe();
        }
        tracing::debug!(epoch, "Sending keepalive ping");

        let monitor = Arc::clone(self);
        let mut probe_timer = lock(&self.probe_timer);
        if let Some(previous) = probe_timer.take() {
            previous.abort();
        }
        *probe_timer = Some(tokio::spawn(async move {
            let probe = dispatcher.request(PING_METHOD, Vec::new());
            let outcome = tokio::time::timeout(probe_timeout, probe).await;
            monitor.probing.store(false, Ordering::SeqCst);

            match outcome {
                Ok(Ok(_)) => tracing::trace!(epoch, "Keepalive ping answered"),
                Ok(Err(e)) => tracing::warn!(epoch, error = %e, "keepalive ping failed"),
                Err(_) => monitor.escalate(epoch, probe_timeout),
            }
        }));
    }

    fn escalate(&self, epoch: u64, probe_timeout: Duration) {
        if self.is_disabled() {
            return;
        }
        tracing::warn!(
            epoch,
            timeout_ms = probe_timeout.as_millis() as u64,
            "keepalive ping timeout"
        );
        if let Some(ref m) = self.metrics {
            m.record_keepalive_timeout();
        }
        self.losses.report(epoch, Error::KeepaliveTimeout);
    }

    /// Allow arming again after a new connection is up
    pub fn resume(&self) {
        if !self.disabled.load(Ordering::SeqCst) {
            self.suspended.store(false, Ordering::SeqCst);
        }
    }

    /// Cancel both timers and ignore `arm()` until `resume()`
    pub fn disarm(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        if let Some(idle) = lock(&self.idle_timer).take() {
            idle.abort();
        }
        if let Some(probe) = lock(&self.probe_timer).take() {
            probe.abort();
        }
        self.probing.store(false, Ordering::SeqCst);
    }

    /// Disarm for good
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
        self.disarm();
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// True while an idle timer is pending
    pub fn is_armed(&self) -> bool {
        lock(&self.idle_timer)
            .as_ref()
            .map_or(false, |timer| !timer.is_finished())
    }

    pub fn is_probing(&self) -> bool {
        self.probing.load(Ordering::SeqCst)
    }
}
