//! Persistence policy: what to do after a detected connection failure
//!
//! A policy is a value, not a strategy object. It carries a retry budget and
//! an optional callback:
//!
//! - while `max_retry > 0`, every detected failure reconnects and spends one
//!   unit of budget;
//! - once the budget is spent, a failure invokes the callback (if any) and
//!   the session stays closed;
//! - with no callback either, the session stays closed silently.
//!
//! A session initialised without any policy (`None`) reconnects forever.
//!
//! # Examples
//!
//! ```rust
//! use electrow_client::{PersistencePolicy, PolicyDecision};
//!
//! let mut policy = PersistencePolicy::new(1).with_callback(|| eprintln!("giving up"));
//! assert!(matches!(policy.decide(), PolicyDecision::Reconnect));
//! assert!(matches!(policy.decide(), PolicyDecision::InvokeCallback(_)));
//! assert_eq!(policy.max_retry(), 0);
//! ```

use std::fmt;
use std::sync::Arc;

/// Zero-argument procedure run when the retry budget is exhausted
pub type PolicyCallback = Arc<dyn Fn() + Send + Sync>;

/// Default retry budget
pub const DEFAULT_MAX_RETRY: u32 = 1000;

/// Retry budget plus exhaustion callback
#[derive(Clone)]
pub struct PersistencePolicy {
    max_retry: u32,
    callback: Option<PolicyCallback>,
}

/// Outcome of consulting the policy after a failure
#[derive(Clone)]
pub enum PolicyDecision {
    /// Reopen the channel and re-run the handshake
    Reconnect,
    /// Budget spent: run the callback, do not reconnect
    InvokeCallback(PolicyCallback),
    /// Budget spent and no callback: stay closed
    StayClosed,
}

impl PersistencePolicy {
    /// Policy with `max_retry` reconnects and no callback
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            callback: None,
        }
    }

    /// Run `callback` once the retry budget is spent
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Remaining reconnects
    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Decide for one detected failure, spending budget on `Reconnect`
    ///
    /// The budget never goes below zero.
    pub fn decide(&mut self) -> PolicyDecision {
        if self.max_retry > 0 {
            self.max_retry -= 1;
            return PolicyDecision::Reconnect;
        }

        match &self.callback {
            Some(callback) => PolicyDecision::InvokeCallback(Arc::clone(callback)),
            None => PolicyDecision::StayClosed,
        }
    }
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY)
    }
}

impl fmt::Debug for PersistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistencePolicy")
            .field("max_retry", &self.max_retry)
            .field("callback", &self.callback.as_ref().map(|_| "Fn()"))
            .finish()
    }
}

impl fmt::Debug for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyDecision::Reconnect => write!(f, "Reconnect"),
            PolicyDecision::InvokeCallback(_) => write!(f, "InvokeCallback"),
            PolicyDecision::StayClosed => write!(f, "StayClosed"),
        }
    }
}
