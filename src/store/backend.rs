//! Persistence and authorization collaborator used by the real-time core.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::{MessageRecord, MessageTarget, NewMessage};

/// Number of messages returned by a history query
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Storage operations the chat service depends on.
///
/// Membership is always answered from storage; callers must not cache it
/// because it can change while a connection is open.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    async fn is_member(&self, user_id: Uuid, space_id: Uuid) -> Result<bool, StoreError>;

    /// Persist a message and return it with the sender's username resolved
    async fn create_message(
        &self,
        sender_id: Uuid,
        message: NewMessage,
    ) -> Result<MessageRecord, StoreError>;

    /// Latest messages of a space, or of the direct conversation between
    /// `user_id` and the recipient, oldest first.
    async fn recent_messages(
        &self,
        user_id: Uuid,
        target: MessageTarget,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}
