use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::MessageRecord;

/// Frame type that carries subscription changes
pub const SUBSCRIBE_FRAME: &str = "subscribe";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Subscribe frame without space_id")]
    MissingSpaceId,
}

/// Wire shape of an inbound control frame
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    space_id: Option<Uuid>,
    #[serde(default)]
    subscribe: bool,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `{"type":"subscribe","space_id":..,"subscribe":true|false}`
    Subscription { space_id: Uuid, subscribe: bool },
    /// Any other `type`; ignored by the handler
    Unrecognized { kind: String },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;

        if raw.kind != SUBSCRIBE_FRAME {
            return Ok(Self::Unrecognized { kind: raw.kind });
        }

        let space_id = raw.space_id.ok_or(FrameError::MissingSpaceId)?;
        Ok(Self::Subscription {
            space_id,
            subscribe: raw.subscribe,
        })
    }

    /// Label used for metrics and logs
    pub fn kind(&self) -> &str {
        match self {
            Self::Subscription { subscribe: true, .. } => "subscribe",
            Self::Subscription { subscribe: false, .. } => "unsubscribe",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Subscribed,
    Unsubscribed,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "message")]
    Message {
        #[serde(flatten)]
        message: MessageRecord,
    },
    #[serde(rename = "subscribe_confirm")]
    SubscribeConfirm {
        space_id: Uuid,
        status: SubscriptionStatus,
    },
    #[serde(rename = "system")]
    System { message: String },
}

impl ServerMessage {
    pub fn welcome() -> Self {
        Self::system("Connected to chat server")
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn subscribed(space_id: Uuid) -> Self {
        Self::SubscribeConfirm {
            space_id,
            status: SubscriptionStatus::Subscribed,
        }
    }

    pub fn unsubscribed(space_id: Uuid) -> Self {
        Self::SubscribeConfirm {
            space_id,
            status: SubscriptionStatus::Unsubscribed,
        }
    }
}

/// Frame queued on a connection's outbound channel
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the connection's writer
    Raw(ServerMessage),
    /// Serialized once and shared by every recipient of a fan-out
    Preserialized(Arc<str>),
    /// WebSocket ping control frame; the client's pong counts as activity
    Ping,
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    /// The frame the connection writer puts on the socket
    pub fn into_frame(self) -> Result<Message, serde_json::Error> {
        match self {
            Self::Raw(message) => Ok(Message::Text(serde_json::to_string(&message)?.into())),
            Self::Preserialized(json) => Ok(Message::Text((&*json).into())),
            Self::Ping => Ok(Message::Ping(Bytes::new())),
        }
    }
}

impl From<ServerMessage> for OutboundMessage {
    fn from(message: ServerMessage) -> Self {
        Self::Raw(message)
    }
}
