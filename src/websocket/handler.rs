use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::{extract_token, AuthUser};
use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::metrics::{StoreMetrics, WsMessageMetrics};
use crate::server::AppState;
use crate::store::ChatStore;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

/// How long a server-side close waits for the close frame to be written
const CLOSE_FRAME_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = query.token.or_else(|| extract_token(&headers)) else {
        return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
    };

    let user = match state
        .jwt_validator
        .validate(&token)
        .and_then(AuthUser::try_from)
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "JWT validation failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(user_id = %user.user_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, user),
    fields(user_id = %user.user_id, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let connection_start = Instant::now();

    let buffer = state.settings.websocket.channel_buffer_size.max(1);
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(buffer);
    let handle = state.connection_manager.connect(user.user_id, tx);
    let connection_id = handle.id;
    WsMessageMetrics::record_opened();

    if handle.send(ServerMessage::welcome()).await.is_err() {
        tracing::debug!(connection_id = %connection_id, "Failed to queue welcome frame");
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound: drain the connection's channel into the socket, then send a
    // close frame once the server closes the connection
    let writer_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                next = rx.recv() => match next {
                    Some(msg) => msg,
                    None => break,
                },
                _ = writer_handle.closed() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            };

            let frame = match msg.into_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Inbound: control frames
    let manager = state.connection_manager.clone();
    let store = state.store.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &manager, store.as_ref(), &recv_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.closed() => {
            tracing::debug!(connection_id = %connection_id, "Connection closed by server");
            let _ = tokio::time::timeout(CLOSE_FRAME_GRACE, &mut send_task).await;
        }
    }

    send_task.abort();
    recv_task.abort();

    state.connection_manager.close(&handle).await;

    let duration = connection_start.elapsed().as_secs_f64();
    WsMessageMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed.
pub(crate) async fn process_message(
    msg: Message,
    manager: &ConnectionManager,
    store: &dyn ChatStore,
    handle: &Arc<ConnectionHandle>,
) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();
            handle_text_frame(text.as_str(), manager, store, handle).await;
            true
        }
        Message::Binary(_) => {
            WsMessageMetrics::record_frame("binary");
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Parse and apply a text control frame. Malformed frames are ignored.
pub(crate) async fn handle_text_frame(
    text: &str,
    manager: &ConnectionManager,
    store: &dyn ChatStore,
    handle: &Arc<ConnectionHandle>,
) {
    let msg = match ClientMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            WsMessageMetrics::record_frame("invalid");
            tracing::debug!(connection_id = %handle.id, error = %e, "Ignoring malformed frame");
            return;
        }
    };

    WsMessageMetrics::record_frame(msg.kind());

    match msg {
        ClientMessage::Subscription {
            space_id,
            subscribe: true,
        } => handle_subscribe(space_id, manager, store, handle).await,
        ClientMessage::Subscription {
            space_id,
            subscribe: false,
        } => handle_unsubscribe(space_id, manager, handle).await,
        ClientMessage::Unrecognized { kind } => {
            tracing::debug!(connection_id = %handle.id, kind = %kind, "Ignoring unrecognized frame");
        }
    }
}

/// Subscribe after a fresh membership check. Non-members are dropped silently.
#[tracing::instrument(
    name = "ws.subscribe",
    skip(manager, store, handle),
    fields(connection_id = %handle.id, user_id = %handle.user_id)
)]
async fn handle_subscribe(
    space_id: Uuid,
    manager: &ConnectionManager,
    store: &dyn ChatStore,
    handle: &Arc<ConnectionHandle>,
) {
    let membership = StoreMetrics::observe(
        store.backend_name(),
        "is_member",
        store.is_member(handle.user_id, space_id),
    )
    .await;

    match membership {
        Ok(true) => {}
        Ok(false) => {
            WsMessageMetrics::record_denied();
            tracing::warn!(
                connection_id = %handle.id,
                user_id = %handle.user_id,
                space_id = %space_id,
                "Subscribe refused: user is not a member of the space"
            );
            return;
        }
        Err(e) => {
            tracing::warn!(
                connection_id = %handle.id,
                space_id = %space_id,
                error = %e,
                "Membership check failed, ignoring subscribe"
            );
            return;
        }
    }

    if !manager.subscribe(handle, space_id).await {
        return;
    }

    if handle.send(ServerMessage::subscribed(space_id)).await.is_err() {
        tracing::debug!(connection_id = %handle.id, "Failed to queue subscribe confirmation");
    }
}

async fn handle_unsubscribe(space_id: Uuid, manager: &ConnectionManager, handle: &Arc<ConnectionHandle>) {
    if manager.unsubscribe(handle, space_id).await
        && handle.send(ServerMessage::unsubscribed(space_id)).await.is_err()
    {
        tracing::debug!(connection_id = %handle.id, "Failed to queue unsubscribe confirmation");
    }
}
