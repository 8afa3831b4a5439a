use axum::{routing::get, Router};

use crate::server::AppState;

use super::health::{health, stats};
use super::messages::{message_history, send_message};
use super::metrics::prometheus_metrics;

/// Unauthenticated operational endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Message endpoints; the caller layers authentication on top
pub fn message_routes() -> Router<AppState> {
    Router::new().route("/messages", get(message_history).post(send_message))
}
