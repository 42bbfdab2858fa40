//! Prometheus Metrics Module
//!
//! Application-wide metrics for the gateway.
//!
//! # Metrics Collected
//! - Registered connection gauge
//! - Online user gauge
//! - Heartbeat miss counter
//! - Connection close counter by reason
//! - Event dispatch counter by outcome

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Registered connection gauge
pub static GATEWAY_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("connections", "Number of registered connections").namespace("chat_gateway"),
    )
    .expect("Failed to create GATEWAY_CONNECTIONS metric")
});

/// Online user gauge
pub static USERS_ONLINE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("users_online", "Number of users with at least one live connection")
            .namespace("chat_gateway"),
    )
    .expect("Failed to create USERS_ONLINE metric")
});

/// Heartbeat misses, total
pub static HEARTBEAT_MISSES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("heartbeat_misses_total", "Total missed heartbeats").namespace("chat_gateway"),
        &["cause"], // "timeout", "send_failed"
    )
    .expect("Failed to create HEARTBEAT_MISSES_TOTAL metric")
});

/// Connections closed, by reason
pub static CONNECTIONS_CLOSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("connections_closed_total", "Total closed connections")
            .namespace("chat_gateway"),
        &["reason"],
    )
    .expect("Failed to create CONNECTIONS_CLOSED_TOTAL metric")
});

/// Event dispatch outcomes
pub static EVENTS_DISPATCHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_dispatched_total", "Per-connection event dispatch outcomes")
            .namespace("chat_gateway"),
        &["outcome"], // "delivered", "failed"
    )
    .expect("Failed to create EVENTS_DISPATCHED_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(GATEWAY_CONNECTIONS.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS");
    registry
        .register(Box::new(USERS_ONLINE.clone()))
        .expect("Failed to register USERS_ONLINE");
    registry
        .register(Box::new(HEARTBEAT_MISSES_TOTAL.clone()))
        .expect("Failed to register HEARTBEAT_MISSES_TOTAL");
    registry
        .register(Box::new(CONNECTIONS_CLOSED_TOTAL.clone()))
        .expect("Failed to register CONNECTIONS_CLOSED_TOTAL");
    registry
        .register(Box::new(EVENTS_DISPATCHED_TOTAL.clone()))
        .expect("Failed to register EVENTS_DISPATCHED_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Helper to set the registered connection count
pub fn set_connections(count: usize) {
    GATEWAY_CONNECTIONS.set(count as i64);
}

/// Helper to set the online user count
pub fn set_users_online(count: usize) {
    USERS_ONLINE.set(count as i64);
}

/// Helper to record a missed heartbeat
pub fn record_heartbeat_miss(cause: &str) {
    HEARTBEAT_MISSES_TOTAL.with_label_values(&[cause]).inc();
}

/// Helper to record a closed connection
pub fn record_connection_closed(reason: &str) {
    CONNECTIONS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
}

/// Helper to record a per-connection dispatch outcome
pub fn record_dispatch(outcome: &str) {
    EVENTS_DISPATCHED_TOTAL.with_label_values(&[outcome]).inc();
}
