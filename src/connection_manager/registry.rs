use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ConnectionHandle;

/// Live connections per user (supports multiple devices).
///
/// A connection is keyed under its own `user_id`, so it can never appear in
/// two users' sets. Empty user entries are removed immediately.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// user_id -> connection_id -> handle
    users: DashMap<Uuid, HashMap<Uuid, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its owner. Registering twice is a no-op.
    pub fn register(&self, handle: &Arc<ConnectionHandle>) {
        let mut connections = self.users.entry(handle.user_id).or_default();
        connections.insert(handle.id, handle.clone());

        tracing::debug!(
            connection_id = %handle.id,
            user_id = %handle.user_id,
            user_connections = connections.len(),
            "Connection registered"
        );
    }

    /// Remove a connection; drops the user entry once it is empty.
    /// Returns whether the connection was registered.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        match self.users.entry(handle.user_id) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&handle.id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of a user's live connections
    pub fn connections_for(&self, user_id: Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.users
            .get(&user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every live connection
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.users
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn connection_count(&self) -> usize {
        self.users.iter().map(|entry| entry.value().len()).sum()
    }
}
