//! Connection statistics

use serde::Serialize;

/// Aggregate connection counts.
///
/// Exposed on the unauthenticated `/stats` endpoint, so it carries no space
/// or user identifiers.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub total_subscriptions: usize,
    /// Spaces with at least one live subscriber
    pub active_spaces: usize,
}
