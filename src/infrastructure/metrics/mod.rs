//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active presence session gauge (last value broadcast)
//! - Connection accept outcomes
//! - Sweep cycle outcomes and expired session counts
//! - Broadcast delivery outcomes
//! - HTTP request counts by method, path, and status

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active sessions as of the most recent broadcast
pub static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("sessions_active", "Number of active presence sessions")
            .namespace("presence_server"),
    )
    .expect("Failed to create SESSIONS_ACTIVE metric")
});

/// Connection accepts by outcome ("accepted", "rejected")
pub static CONNECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("connections_total", "Total number of gateway connection attempts")
            .namespace("presence_server"),
        &["outcome"],
    )
    .expect("Failed to create CONNECTIONS_TOTAL metric")
});

/// Sweep cycles by outcome ("ok", "failed")
pub static SWEEPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sweeps_total", "Total number of reconciliation sweep cycles")
            .namespace("presence_server"),
        &["outcome"],
    )
    .expect("Failed to create SWEEPS_TOTAL metric")
});

/// Sessions expired by the sweeper
pub static SESSIONS_EXPIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "sessions_expired_total",
            "Total number of sessions marked inactive by the sweeper",
        )
        .namespace("presence_server"),
    )
    .expect("Failed to create SESSIONS_EXPIRED_TOTAL metric")
});

/// Per-connection broadcast deliveries by outcome ("sent", "dropped", "closed")
pub static BROADCAST_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "broadcast_deliveries_total",
            "Total number of presence updates enqueued per connection",
        )
        .namespace("presence_server"),
        &["outcome"],
    )
    .expect("Failed to create BROADCAST_DELIVERIES_TOTAL metric")
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace("presence_server"),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .expect("Failed to register SESSIONS_ACTIVE");
    registry
        .register(Box::new(CONNECTIONS_TOTAL.clone()))
        .expect("Failed to register CONNECTIONS_TOTAL");
    registry
        .register(Box::new(SWEEPS_TOTAL.clone()))
        .expect("Failed to register SWEEPS_TOTAL");
    registry
        .register(Box::new(SESSIONS_EXPIRED_TOTAL.clone()))
        .expect("Failed to register SESSIONS_EXPIRED_TOTAL");
    registry
        .register(Box::new(BROADCAST_DELIVERIES_TOTAL.clone()))
        .expect("Failed to register BROADCAST_DELIVERIES_TOTAL");
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record the count most recently delivered to clients
pub fn set_active_sessions(count: u64) {
    SESSIONS_ACTIVE.set(count as i64);
}

/// Helper to record a gateway accept outcome
pub fn record_connection(outcome: &str) {
    CONNECTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record a sweep cycle
pub fn record_sweep(outcome: &str, expired: u64) {
    SWEEPS_TOTAL.with_label_values(&[outcome]).inc();
    SESSIONS_EXPIRED_TOTAL.inc_by(expired);
}

/// Helper to record one per-connection delivery attempt
pub fn record_delivery(outcome: &str) {
    BROADCAST_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}
