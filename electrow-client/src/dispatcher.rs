//! Request dispatcher
//!
//! Every call and batch call leaves through here. The dispatcher stamps
//! `time_last_call` before handing the call to the channel and re-arms the
//! keepalive monitor only after the channel reports success, so a call that
//! never completes cannot hold off liveness detection. Errors go back to the
//! caller untouched; reconnecting is the supervisor's job.

use crate::channel::RpcChannel;
use crate::keepalive::KeepaliveMonitor;
use crate::metrics::ClientMetrics;
use electrow_core::{Error, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

#[derive(Clone)]
pub struct RequestDispatcher {
    channel: Arc<dyn RpcChannel>,
    keepalive: Arc<KeepaliveMonitor>,
    last_call: Arc<Mutex<Option<Instant>>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RequestDispatcher {
    pub fn new(
        channel: Arc<dyn RpcChannel>,
        keepalive: Arc<KeepaliveMonitor>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        Self {
            channel,
            keepalive,
            last_call: Arc::new(Mutex::new(None)),
            metrics,
        }
    }

    /// Start of the most recent call, `None` before the first one
    pub fn time_last_call(&self) -> Option<Instant> {
        *self.last_call.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the last call, as at the start of a new session
    pub fn reset_last_call(&self) {
        *self.last_call.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn stamp(&self) -> Instant {
        let now = Instant::now();
        *self.last_call.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        now
    }

    #[tracing::instrument(skip(self, method, params), fields(method = %method))]
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let started = self.stamp();
        let outcome = self.channel.call(method, params).await;
        self.record(method, outcome.as_ref().err(), started);

        let result = outcome?;
        self.keepalive.arm(self.clone());
        Ok(result)
    }

    #[tracing::instrument(
        skip(self, method, params, extra),
        fields(method = %method, batch_size = params.len())
    )]
    pub async fn request_batch(
        &self,
        method: &str,
        params: Vec<Value>,
        extra: Option<Value>,
    ) -> Result<Vec<Value>> {
        let size = params.len() as u64;
        let started = self.stamp();
        let outcome = self.channel.call_batch(method, params, extra).await;
        self.record(method, outcome.as_ref().err(), started);
        if let Some(ref m) = self.metrics {
            m.record_batch(method, size);
        }

        let results = outcome?;
        self.keepalive.arm(self.clone());
        Ok(results)
    }

    fn record(&self, method: &str, error: Option<&Error>, started: Instant) {
        let duration = started.elapsed().as_secs_f64();
        match error {
            None => {
                tracing::debug!(duration_secs = duration, "Call completed");
                if let Some(ref m) = self.metrics {
                    m.record_request(method, "success", duration);
                }
            }
            Some(e) => {
                if e.is_connection_level() {
                    tracing::warn!(error = %e, duration_secs = duration, "Call failed");
                } else {
                    tracing::debug!(error = %e, duration_secs = duration, "Call failed");
                }
                if let Some(ref m) = self.metrics {
                    m.record_request(method, "error", duration);
                    m.record_error(e.kind());
                }
            }
        }
    }
}
