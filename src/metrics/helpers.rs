//! Metrics helper structs for convenient metric recording

use std::future::Future;
use std::time::Instant;

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_EVICTED_TOTAL, CONNECTIONS_TOTAL, DELIVERY_QUEUE_DROPPED_TOTAL,
    HEARTBEAT_DURATION_MS, HEARTBEAT_TIMEOUTS, MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL,
    MESSAGES_SENT_TOTAL, MESSAGE_DELIVERY_LATENCY, SPACES_ACTIVE, STORE_ERRORS_TOTAL,
    STORE_OPERATION_LATENCY, SUBSCRIPTIONS_DENIED_TOTAL, SUBSCRIPTIONS_TOTAL, USERS_CONNECTED,
    WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};
use crate::connection_manager::ConnectionStats;
use crate::store::StoreError;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Gauges derived from the routing tables
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn update(stats: &ConnectionStats) {
        CONNECTIONS_TOTAL.set(stats.total_connections as i64);
        USERS_CONNECTED.set(stats.unique_users as i64);
        SPACES_ACTIVE.set(stats.active_spaces as i64);
        SUBSCRIPTIONS_TOTAL.set(stats.total_subscriptions as i64);
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record a message fanned out to a target kind ("space" or "direct")
    pub fn record_sent(target: &str) {
        MESSAGES_SENT_TOTAL.with_label_values(&[target]).inc();
    }

    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        MESSAGES_FAILED_TOTAL.inc_by(count);
    }

    pub fn record_latency(latency_secs: f64) {
        MESSAGE_DELIVERY_LATENCY.observe(latency_secs);
    }

    /// Record a connection flagged after a failed push
    pub fn record_eviction(reason: &str) {
        CONNECTIONS_EVICTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_queue_dropped() {
        DELIVERY_QUEUE_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for WebSocket lifecycle and frame metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    /// Record an inbound frame by kind
    pub fn record_frame(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }

    /// Record a subscribe refused by the membership check
    pub fn record_denied() {
        SUBSCRIPTIONS_DENIED_TOTAL.inc();
    }
}

/// Helper struct for heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    pub fn record_timeouts(count: u64) {
        HEARTBEAT_TIMEOUTS.inc_by(count);
    }
}

/// Helper struct for store (persistence) metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_latency(backend: &str, operation: &str, latency_secs: f64) {
        STORE_OPERATION_LATENCY
            .with_label_values(&[backend, operation])
            .observe(latency_secs);
    }

    pub fn record_error(backend: &str, operation: &str) {
        STORE_ERRORS_TOTAL
            .with_label_values(&[backend, operation])
            .inc();
    }

    /// Time a store call and count its failure
    pub async fn observe<T, F>(backend: &str, operation: &str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();
        let result = call.await;
        Self::record_latency(backend, operation, start.elapsed().as_secs_f64());
        if result.is_err() {
            Self::record_error(backend, operation);
        }
        result
    }
}
