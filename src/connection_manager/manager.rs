use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ConnectionHandle, ConnectionRegistry, ConnectionStats, SubscriptionTable};
use crate::websocket::OutboundMessage;

/// Owns both routing tables and the connection lifecycle.
///
/// Every path that ends a connection (socket close, failed push, idle
/// timeout, shutdown) goes through [`ConnectionManager::close`], which runs
/// cleanup exactly once per connection.
#[derive(Default)]
pub struct ConnectionManager {
    registry: ConnectionRegistry,
    subscriptions: SubscriptionTable,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create, open and register a connection for an authenticated user
    pub fn connect(&self, user_id: Uuid, sender: mpsc::Sender<OutboundMessage>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(user_id, sender));
        handle.mark_open();
        self.registry.register(&handle);

        tracing::info!(
            connection_id = %handle.id,
            user_id = %user_id,
            "Connection opened"
        );
        handle
    }

    /// Subscribe a connection to a space (membership already checked)
    pub async fn subscribe(&self, handle: &Arc<ConnectionHandle>, space_id: Uuid) -> bool {
        self.subscriptions.subscribe(space_id, handle).await
    }

    pub async fn unsubscribe(&self, handle: &ConnectionHandle, space_id: Uuid) -> bool {
        self.subscriptions.unsubscribe(space_id, handle).await
    }

    /// Close a connection and remove it from both tables.
    /// Returns true only for the call that performed the cleanup.
    pub async fn close(&self, handle: &ConnectionHandle) -> bool {
        if !handle.try_close() {
            return false;
        }

        self.registry.unregister(handle);
        let spaces = self.subscriptions.unsubscribe_all(handle).await;

        tracing::info!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            spaces = spaces,
            duration_secs = (Utc::now() - handle.connected_at).num_seconds(),
            "Connection closed"
        );
        true
    }

    pub fn user_connections(&self, user_id: Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.registry.connections_for(user_id)
    }

    pub fn space_connections(&self, space_id: Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.subscriptions.connections_for(space_id)
    }

    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.registry.all_connections()
    }

    pub fn is_user_online(&self, user_id: Uuid) -> bool {
        self.registry.is_online(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.subscriptions.total_subscriptions()
    }

    /// Close connections with no inbound activity for `timeout_secs`
    pub async fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(timeout_secs as i64);
        let stale: Vec<_> = self
            .registry
            .all_connections()
            .into_iter()
            .filter(|handle| handle.last_activity() < cutoff)
            .collect();

        let mut removed = 0;
        for handle in stale {
            tracing::debug!(
                connection_id = %handle.id,
                last_activity = %handle.last_activity(),
                "Closing idle connection"
            );
            if self.close(&handle).await {
                removed += 1;
            }
        }
        removed
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.registry.connection_count(),
            unique_users: self.registry.user_count(),
            total_subscriptions: self.subscriptions.total_subscriptions(),
            active_spaces: self.subscriptions.space_count(),
        }
    }
}
