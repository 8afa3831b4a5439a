//! Message send and history endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::delivery::ConversationKey;
use crate::error::{AppError, Result};
use crate::metrics::StoreMetrics;
use crate::server::AppState;
use crate::store::{MessageRecord, MessageTarget, NewMessage};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub space_id: Option<Uuid>,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub space_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
}

fn parse_target(space_id: Option<Uuid>, recipient_id: Option<Uuid>) -> Result<MessageTarget> {
    MessageTarget::from_parts(space_id, recipient_id).ok_or_else(|| {
        AppError::Validation("Exactly one of space_id or recipient_id is required".to_string())
    })
}

async fn ensure_member(state: &AppState, user_id: Uuid, target: MessageTarget) -> Result<()> {
    let MessageTarget::Space(space_id) = target else {
        return Ok(());
    };

    let store = state.store.as_ref();
    let is_member =
        StoreMetrics::observe(store.backend_name(), "is_member", store.is_member(user_id, space_id))
            .await?;
    if !is_member {
        return Err(AppError::Forbidden("Not a member of this space".to_string()));
    }
    Ok(())
}

/// POST /api/messages
///
/// Persists the message, then hands it to the delivery queue. The response
/// does not wait for live delivery.
#[tracing::instrument(
    name = "api.send_message",
    skip(state, user, request),
    fields(sender_id = %user.user_id)
)]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageRecord>)> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Message content is required".to_string()));
    }
    let target = parse_target(request.space_id, request.recipient_id)?;
    ensure_member(&state, user.user_id, target).await?;

    let message = NewMessage {
        content: content.to_string(),
        target,
    };
    let store = state.store.as_ref();
    let record = state
        .sequencer
        .run(ConversationKey::new(user.user_id, target), async {
            let record = StoreMetrics::observe(
                store.backend_name(),
                "create_message",
                store.create_message(user.user_id, message),
            )
            .await?;
            state.delivery_queue.enqueue(record.clone());
            Ok::<_, AppError>(record)
        })
        .await?;

    tracing::info!(
        message_id = %record.id,
        target = target.kind(),
        "Message created"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/messages?space_id=..|recipient_id=..
pub async fn message_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageRecord>>> {
    let target = parse_target(query.space_id, query.recipient_id)?;
    ensure_member(&state, user.user_id, target).await?;

    let store = state.store.as_ref();
    let messages = StoreMetrics::observe(
        store.backend_name(),
        "recent_messages",
        store.recent_messages(user.user_id, target),
    )
    .await?;

    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let id = Uuid::new_v4();
        assert_eq!(parse_target(Some(id), None).unwrap(), MessageTarget::Space(id));
        assert_eq!(parse_target(None, Some(id)).unwrap(), MessageTarget::Direct(id));
        assert!(matches!(parse_target(None, None), Err(AppError::Validation(_))));
        assert!(matches!(
            parse_target(Some(id), Some(Uuid::new_v4())),
            Err(AppError::Validation(_))
        ));
    }
}
