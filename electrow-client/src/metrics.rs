//! Session metrics
//!
//! OpenTelemetry instruments for session health. They are created only when
//! the session is built with observability enabled, and exported by whatever
//! meter provider `electrow_core::init_observability` installed.
//!
//! # Metrics Collected
//!
//! - **connection.state**: current [`ConnectionState`](crate::ConnectionState) code (gauge)
//! - **requests.total** / **request.duration**: calls by method and status
//! - **batch.size**: entries per batch call (histogram)
//! - **errors.total**: errors by kind
//! - **reconnection.attempts** / **reconnection.success**: reconnect outcomes
//! - **keepalive.probes** / **keepalive.timeouts**: liveness probing
//! - **notifications.received**: pushes by event name

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

/// Instruments recorded by the session
pub struct ClientMetrics {
    /// 0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 failed, 5 closed
    pub connection_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    /// Seconds per call
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
    pub batch_size: Histogram<u64>,
    pub keepalive_probes: Counter<u64>,
    pub keepalive_timeouts: Counter<u64>,
    pub notifications_received: Counter<u64>,
}

impl ClientMetrics {
    /// Instruments on the global meter provider, scoped to `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        Self::new_with_meter(&global::meter_with_scope(scope))
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("electrow.client.connection.state")
                .with_description(
                    "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=failed, 5=closed)",
                )
                .build(),
            requests_total: meter
                .u64_counter("electrow.client.requests.total")
                .with_description("Total number of calls dispatched")
                .build(),
            request_duration: meter
                .f64_histogram("electrow.client.request.duration")
                .with_description("Call duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("electrow.client.errors.total")
                .with_description("Total number of errors by kind")
                .build(),
            reconnection_attempts: meter
                .u64_counter("electrow.client.reconnection.attempts")
                .with_description("Reconnects started after a detected failure")
                .build(),
            reconnection_success: meter
                .u64_counter("electrow.client.reconnection.success")
                .with_description("Reconnects that completed the handshake")
                .build(),
            batch_size: meter
                .u64_histogram("electrow.client.batch.size")
                .with_description("Entries per batch call")
                .build(),
            keepalive_probes: meter
                .u64_counter("electrow.client.keepalive.probes")
                .with_description("Keepalive pings sent after a silent window")
                .build(),
            keepalive_timeouts: meter
                .u64_counter("electrow.client.keepalive.timeouts")
                .with_description("Keepalive pings that outlived the probe timeout")
                .build(),
            notifications_received: meter
                .u64_counter("electrow.client.notifications.received")
                .with_description("Server push notifications received")
                .build(),
        }
    }

    pub fn update_connection_state(&self, code: i64) {
        self.connection_state.record(code, &[]);
    }

    pub fn record_request(&self, method: &str, status: &'static str, duration_secs: f64) {
        let attributes = [
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status),
        ];
        self.requests_total.add(1, &attributes);
        self.request_duration.record(duration_secs, &attributes);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors_total.add(1, &[KeyValue::new("error_type", kind)]);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    pub fn record_batch(&self, method: &str, size: u64) {
        self.batch_size
            .record(size, &[KeyValue::new("method", method.to_string())]);
    }

    pub fn record_keepalive_probe(&self) {
        self.keepalive_probes.add(1, &[]);
    }

    pub fn record_keepalive_timeout(&self) {
        self.keepalive_timeouts.add(1, &[]);
    }

    pub fn record_notification(&self, event: &str) {
        self.notifications_received
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }
}
