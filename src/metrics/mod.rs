//! Prometheus metrics for the chat service.
//!
//! - Connection metrics (active connections, users, spaces)
//! - WebSocket lifecycle and inbound frame counters
//! - Delivery metrics (sent by target, delivered, failed, latency, evictions)
//! - Heartbeat and store metrics

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, DeliveryMetrics, HeartbeatMetrics, StoreMetrics,
    WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of active WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of active WebSocket connections"
    ).unwrap();

    /// Number of unique connected users
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of unique connected users"
    ).unwrap();

    /// Spaces with at least one live subscriber
    pub static ref SPACES_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_spaces_active", METRIC_PREFIX),
        "Total number of spaces with at least one subscriber"
    ).unwrap();

    /// Live (connection, space) subscriptions
    pub static ref SUBSCRIPTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_subscriptions_total", METRIC_PREFIX),
        "Total number of live space subscriptions"
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Inbound control frames by kind
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total inbound WebSocket frames by kind",
        &["kind"]
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Subscribe requests refused because the user is not a member
    pub static ref SUBSCRIPTIONS_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_subscriptions_denied_total", METRIC_PREFIX),
        "Total subscribe requests refused by the membership check"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Messages handed to the delivery engine by target kind
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages delivered by target kind",
        &["target"]
    ).unwrap();

    /// Successful pushes (connection count)
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages successfully pushed to connections"
    ).unwrap();

    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total failed pushes"
    ).unwrap();

    /// Time spent fanning out a single message
    pub static ref MESSAGE_DELIVERY_LATENCY: Histogram = register_histogram!(
        format!("{}_message_delivery_latency_seconds", METRIC_PREFIX),
        "Fan-out latency per message in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Connections flagged for eviction by reason
    pub static ref CONNECTIONS_EVICTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_evicted_total", METRIC_PREFIX),
        "Total connections evicted after a failed push",
        &["reason"]
    ).unwrap();

    /// Live deliveries dropped because the delivery queue was full
    pub static ref DELIVERY_QUEUE_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_queue_dropped_total", METRIC_PREFIX),
        "Total live deliveries dropped on a full delivery queue"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Ping round duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total pings that could not be queued in time"
    ).unwrap();

    // ============================================================================
    // Store Metrics
    // ============================================================================

    pub static ref STORE_OPERATION_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_store_operation_latency_seconds", METRIC_PREFIX),
        "Chat store operation latency in seconds",
        &["backend", "operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Total chat store errors",
        &["backend", "operation"]
    ).unwrap();
}
