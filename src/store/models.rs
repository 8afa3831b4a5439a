use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat message together with the sender's display name.
///
/// This is both the HTTP response body and the payload pushed to live
/// connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub sender_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<Uuid>,
    pub is_direct_message: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_edited: bool,
}

/// Where a message is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    Space(Uuid),
    Direct(Uuid),
}

impl MessageTarget {
    /// Build a target from the two optional ids; exactly one must be present
    pub fn from_parts(space_id: Option<Uuid>, recipient_id: Option<Uuid>) -> Option<Self> {
        match (space_id, recipient_id) {
            (Some(space_id), None) => Some(Self::Space(space_id)),
            (None, Some(recipient_id)) => Some(Self::Direct(recipient_id)),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Space(_) => "space",
            Self::Direct(_) => "direct",
        }
    }
}

impl MessageRecord {
    pub fn target(&self) -> Option<MessageTarget> {
        MessageTarget::from_parts(self.space_id, self.recipient_id)
    }
}

/// A message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub content: String,
    pub target: MessageTarget,
}
