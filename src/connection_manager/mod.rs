//! Connection management for WebSocket connections
//!
//! This module provides:
//! - Connection handles and their lifecycle
//! - The per-user connection registry
//! - The per-space subscription table
//! - Connection statistics

mod handle;
mod manager;
mod registry;
mod stats;
mod subscriptions;

pub use handle::{ConnectionHandle, ConnectionState, PushError};
pub use manager::ConnectionManager;
pub use registry::ConnectionRegistry;
pub use stats::ConnectionStats;
pub use subscriptions::SubscriptionTable;
