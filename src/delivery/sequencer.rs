use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::MessageTarget;

/// A space, or the unordered pair of users in a direct conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Space(Uuid),
    Direct(Uuid, Uuid),
}

impl ConversationKey {
    pub fn new(sender_id: Uuid, target: MessageTarget) -> Self {
        match target {
            MessageTarget::Space(space_id) => Self::Space(space_id),
            MessageTarget::Direct(recipient_id) => {
                let (a, b) = if sender_id <= recipient_id {
                    (sender_id, recipient_id)
                } else {
                    (recipient_id, sender_id)
                };
                Self::Direct(a, b)
            }
        }
    }
}

/// Serializes persist-then-enqueue per conversation, so the delivery queue
/// sees each conversation's messages in persistence order.
#[derive(Default)]
pub struct SendSequencer {
    locks: DashMap<ConversationKey, Arc<Mutex<()>>>,
}

impl SendSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` while holding the conversation's lock
    pub async fn run<F, T>(&self, key: ConversationKey, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.locks.entry(key).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            op.await
        };
        drop(lock);

        // Only the map holds it once nobody is waiting
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Conversations with a send in progress
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}
