//! In-memory chat store using DashMap.
//!
//! Intended for development and tests. Users and memberships come from a
//! JSON seed file or the inherent methods; everything is lost on restart.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::{ChatStore, StoreError, HISTORY_LIMIT};
use super::{MessageRecord, MessageTarget, NewMessage};

/// Contents of `database.seed_path`
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub spaces: Vec<SeedSpace>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedSpace {
    pub id: Uuid,
    #[serde(default)]
    pub members: Vec<Uuid>,
}

#[derive(Default)]
pub struct MemoryChatStore {
    /// user_id -> username
    users: DashMap<Uuid, String>,
    /// space_id -> member user ids
    members: DashMap<Uuid, HashSet<Uuid>>,
    /// Messages in persistence order
    messages: RwLock<Vec<MessageRecord>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: MemorySeed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.add_user(user.id, user.username);
        }
        for space in seed.spaces {
            for member in space.members {
                store.add_member(space.id, member);
            }
        }
        store
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn space_count(&self) -> usize {
        self.members.len()
    }

    pub fn add_user(&self, user_id: Uuid, username: impl Into<String>) {
        self.users.insert(user_id, username.into());
    }

    pub fn add_member(&self, space_id: Uuid, user_id: Uuid) {
        self.members.entry(space_id).or_default().insert(user_id);
    }

    pub fn remove_member(&self, space_id: Uuid, user_id: Uuid) {
        self.members.remove_if_mut(&space_id, |_, members| {
            members.remove(&user_id);
            members.is_empty()
        });
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn is_member(&self, user_id: Uuid, space_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .members
            .get(&space_id)
            .map(|members| members.contains(&user_id))
            .unwrap_or(false))
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        message: NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let sender_username = self
            .users
            .get(&sender_id)
            .map(|name| name.clone())
            .ok_or_else(|| StoreError::NotFound("User".to_string()))?;

        let (space_id, recipient_id) = match message.target {
            MessageTarget::Space(space_id) => (Some(space_id), None),
            MessageTarget::Direct(recipient_id) => (None, Some(recipient_id)),
        };

        let now = Utc::now();
        let record = MessageRecord {
            id: Uuid::new_v4(),
            content: message.content,
            sender_id,
            sender_username,
            space_id,
            recipient_id,
            is_direct_message: recipient_id.is_some(),
            created_at: now,
            updated_at: now,
            is_edited: false,
        };

        self.messages.write().await.push(record.clone());

        tracing::debug!(
            message_id = %record.id,
            sender_id = %sender_id,
            "Message stored in memory"
        );

        Ok(record)
    }

    async fn recent_messages(
        &self,
        user_id: Uuid,
        target: MessageTarget,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let messages = self.messages.read().await;

        let matches = |m: &&MessageRecord| match target {
            MessageTarget::Space(space_id) => m.space_id == Some(space_id),
            MessageTarget::Direct(peer) => {
                (m.sender_id == user_id && m.recipient_id == Some(peer))
                    || (m.sender_id == peer && m.recipient_id == Some(user_id))
            }
        };

        let mut recent: Vec<MessageRecord> = messages
            .iter()
            .rev()
            .filter(matches)
            .take(HISTORY_LIMIT)
            .cloned()
            .collect();
        recent.reverse();

        Ok(recent)
    }
}
