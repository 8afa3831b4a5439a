//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::ConnectionStats;
use crate::delivery::DeliveryStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: String,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub unique_users: usize,
    pub spaces_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub delivery: DeliveryStatsSnapshot,
    pub delivery_queue: DeliveryQueueStats,
}

#[derive(Debug, Serialize)]
pub struct DeliveryQueueStats {
    pub pending: usize,
    pub dropped: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let conn_stats = state.connection_manager.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: state.store.backend_name().to_string(),
        connections: ConnectionHealthResponse {
            total: conn_stats.total_connections,
            unique_users: conn_stats.unique_users,
            spaces_count: conn_stats.active_spaces,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connection_manager.stats(),
        delivery: state.delivery_engine.stats(),
        delivery_queue: DeliveryQueueStats {
            pending: state.delivery_queue.pending(),
            dropped: state.delivery_queue.dropped(),
        },
    })
}
