use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ConnectionHandle;

/// Live connections per space.
///
/// Each handle carries the reverse index (its own subscribed spaces). The
/// handle's lock is taken before the table shard and held across the table
/// update, so the two views never diverge and `unsubscribe_all` only touches
/// the spaces the connection actually joined.
#[derive(Default)]
pub struct SubscriptionTable {
    /// space_id -> connection_id -> handle
    spaces: DashMap<Uuid, HashMap<Uuid, Arc<ConnectionHandle>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a space. Membership must already be verified.
    /// Returns false if the connection is already closed.
    pub async fn subscribe(&self, space_id: Uuid, handle: &Arc<ConnectionHandle>) -> bool {
        let mut joined = handle.subscriptions.lock().await;
        if handle.is_closed() {
            return false;
        }

        self.spaces
            .entry(space_id)
            .or_default()
            .insert(handle.id, handle.clone());
        joined.insert(space_id);

        tracing::debug!(
            connection_id = %handle.id,
            space_id = %space_id,
            "Subscribed to space"
        );
        true
    }

    /// Remove a connection from a space. Returns whether it was subscribed.
    pub async fn unsubscribe(&self, space_id: Uuid, handle: &ConnectionHandle) -> bool {
        let mut joined = handle.subscriptions.lock().await;
        let was_subscribed = joined.remove(&space_id);
        self.remove_from_space(space_id, handle.id);

        if was_subscribed {
            tracing::debug!(
                connection_id = %handle.id,
                space_id = %space_id,
                "Unsubscribed from space"
            );
        }
        was_subscribed
    }

    /// Remove a connection from every space it joined. Returns the count.
    pub async fn unsubscribe_all(&self, handle: &ConnectionHandle) -> usize {
        let mut joined = handle.subscriptions.lock().await;
        let count = joined.len();
        for space_id in joined.drain() {
            self.remove_from_space(space_id, handle.id);
        }
        count
    }

    /// Snapshot of a space's subscribers
    pub fn connections_for(&self, space_id: Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.spaces
            .get(&space_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn space_count(&self) -> usize {
        self.spaces.len()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.spaces.iter().map(|entry| entry.value().len()).sum()
    }

    fn remove_from_space(&self, space_id: Uuid, connection_id: Uuid) {
        if let Entry::Occupied(mut entry) = self.spaces.entry(space_id) {
            entry.get_mut().remove(&connection_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn open_handle() -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(1);
        let handle = Arc::new(ConnectionHandle::new(Uuid::new_v4(), tx));
        handle.mark_open();
        handle
    }

    fn ids(handles: &[Arc<ConnectionHandle>]) -> Vec<Uuid> {
        let mut ids: Vec<_> = handles.iter().map(|h| h.id).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let table = SubscriptionTable::new();
        let space = Uuid::new_v4();
        let a = open_handle();
        let b = open_handle();

        assert!(table.subscribe(space, &a).await);
        assert!(table.subscribe(space, &b).await);
        assert!(table.subscribe(space, &a).await);

        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids(&table.connections_for(space)), expected);

        assert!(table.unsubscribe(space, &a).await);
        assert!(!table.unsubscribe(space, &a).await);
        assert_eq!(ids(&table.connections_for(space)), vec![b.id]);
    }

    #[tokio::test]
    async fn test_empty_space_is_pruned() {
        let table = SubscriptionTable::new();
        let space = Uuid::new_v4();
        let a = open_handle();

        table.subscribe(space, &a).await;
        assert_eq!(table.space_count(), 1);

        table.unsubscribe(space, &a).await;
        assert_eq!(table.space_count(), 0);
        assert!(table.connections_for(space).is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_all_matches_individual_unsubscribes() {
        let table = SubscriptionTable::new();
        let spaces: Vec<_> = (0..3).map(|_| Uuid::new_v4()).collect();
        let leaving = open_handle();
        let staying = open_handle();

        for space in &spaces {
            table.subscribe(*space, &leaving).await;
        }
        table.subscribe(spaces[0], &staying).await;

        assert_eq!(table.unsubscribe_all(&leaving).await, 3);
        assert!(leaving.subscribed_spaces().await.is_empty());

        assert_eq!(ids(&table.connections_for(spaces[0])), vec![staying.id]);
        assert!(table.connections_for(spaces[1]).is_empty());
        assert!(table.connections_for(spaces[2]).is_empty());
        assert_eq!(table.space_count(), 1);
        assert_eq!(table.total_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_reverse_index_tracks_table() {
        let table = SubscriptionTable::new();
        let x = Uuid::new_v4();
        let y = Uuid::new_v4();
        let conn = open_handle();

        table.subscribe(x, &conn).await;
        table.subscribe(y, &conn).await;
        table.unsubscribe(x, &conn).await;

        assert_eq!(conn.subscribed_spaces().await, vec![y]);
        assert_eq!(table.connections_for(y).len(), 1);
        assert_eq!(table.space_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_connection_cannot_subscribe() {
        let table = SubscriptionTable::new();
        let conn = open_handle();
        conn.try_close();

        assert!(!table.subscribe(Uuid::new_v4(), &conn).await);
        assert_eq!(table.space_count(), 0);
    }
}
