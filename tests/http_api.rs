//! HTTP API integration tests
//!
//! Drives the full router against the in-memory store with real signed
//! tokens. Background workers run so sent messages reach live connections.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ws::Message,
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;
use uuid::Uuid;

use spaces_chat_service::auth::Claims;
use spaces_chat_service::config::{
    DatabaseConfig, DeliveryConfig, JwtConfig, OtelConfig, ServerConfig, Settings,
    WebSocketConfig,
};
use spaces_chat_service::server::{create_app, AppState};
use spaces_chat_service::store::MemoryChatStore;
use spaces_chat_service::websocket::OutboundMessage;

const SECRET: &str = "integration-test-secret";

// ============================================================================
// Helpers
// ============================================================================

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<MemoryChatStore>,
    _shutdown: broadcast::Sender<()>,
}

fn settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        database: DatabaseConfig::default(),
        websocket: WebSocketConfig::default(),
        delivery: DeliveryConfig::default(),
        otel: OtelConfig::default(),
    }
}

fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryChatStore::new());
    let (state, channels) = AppState::new(settings(), store.clone());
    let (shutdown_tx, _) = broadcast::channel(1);
    state.spawn_workers(channels, &shutdown_tx);

    TestApp {
        router: create_app(state.clone()),
        state,
        store,
        _shutdown: shutdown_tx,
    }
}

fn token_for(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        email: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn post_message(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/messages")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn next_message(rx: &mut mpsc::Receiver<OutboundMessage>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no frame delivered in time")
            .expect("connection channel closed");
        let Message::Text(text) = frame.into_frame().unwrap() else {
            continue;
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        if value["type"] == "message" {
            return value;
        }
    }
}

// ============================================================================
// Operational endpoints
// ============================================================================

#[tokio::test]
async fn test_health_reports_store_and_connections() {
    let app = spawn_app();
    let (tx, _rx) = mpsc::channel(8);
    app.state.connection_manager.connect(Uuid::new_v4(), tx);

    let (status, body) = send(&app.router, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["connections"]["total"], 1);
}

#[tokio::test]
async fn test_stats_endpoint_is_public() {
    let app = spawn_app();

    let (status, body) = send(&app.router, get("/stats", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivery_queue"]["dropped"], 0);
    assert_eq!(body["connections"]["total_connections"], 0);
    assert_eq!(body["connections"]["active_spaces"], 0);
}

#[tokio::test]
async fn test_stats_do_not_expose_space_ids() {
    let app = spawn_app();
    let space = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    let conn = app.state.connection_manager.connect(Uuid::new_v4(), tx);
    assert!(app.state.connection_manager.subscribe(&conn, space).await);

    let (status, body) = send(&app.router, get("/stats", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"]["active_spaces"], 1);
    assert_eq!(body["connections"]["total_subscriptions"], 1);
    assert!(body["connections"].get("spaces").is_none());
    assert!(!body.to_string().contains(&space.to_string()));
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_send_without_token_is_unauthorized() {
    let app = spawn_app();

    let request = post_message(None, json!({ "content": "hi", "space_id": Uuid::new_v4() }));
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_send_with_forged_token_is_unauthorized() {
    let app = spawn_app();

    let forged = encode(
        &Header::default(),
        &Claims {
            sub: Uuid::new_v4().to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: chrono::Utc::now().timestamp(),
            email: None,
        },
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let request = post_message(Some(&forged), json!({ "content": "hi", "recipient_id": Uuid::new_v4() }));
    let (status, _) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_history_accepts_token_cookie() {
    let app = spawn_app();
    let user = Uuid::new_v4();
    app.store.add_user(user, "alice");

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/messages?recipient_id={}", Uuid::new_v4()))
        .header(header::COOKIE, format!("theme=dark; token={}", token_for(user)))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ============================================================================
// Validation and authorization
// ============================================================================

#[tokio::test]
async fn test_blank_content_is_rejected() {
    let app = spawn_app();
    let user = Uuid::new_v4();
    app.store.add_user(user, "alice");

    let request = post_message(
        Some(&token_for(user)),
        json!({ "content": "   ", "recipient_id": Uuid::new_v4() }),
    );
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.message_count().await, 0);
}

#[tokio::test]
async fn test_exactly_one_target_is_required() {
    let app = spawn_app();
    let user = Uuid::new_v4();
    app.store.add_user(user, "alice");
    let token = token_for(user);

    let both = post_message(
        Some(&token),
        json!({ "content": "hi", "space_id": Uuid::new_v4(), "recipient_id": Uuid::new_v4() }),
    );
    let (status, _) = send(&app.router, both).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let neither = post_message(Some(&token), json!({ "content": "hi" }));
    let (status, _) = send(&app.router, neither).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.store.message_count().await, 0);
}

#[tokio::test]
async fn test_non_member_cannot_post_or_read_space() {
    let app = spawn_app();
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    app.store.add_user(user, "mallory");
    let token = token_for(user);

    let (status, body) = send(
        &app.router,
        post_message(Some(&token), json!({ "content": "hi", "space_id": space })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app.router,
        get(&format!("/api/messages?space_id={}", space), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Send, deliver, history
// ============================================================================

#[tokio::test]
async fn test_space_message_is_persisted_and_delivered_to_subscribers() {
    let app = spawn_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let space = Uuid::new_v4();
    app.store.add_user(alice, "alice");
    app.store.add_user(bob, "bob");
    app.store.add_member(space, alice);
    app.store.add_member(space, bob);

    let (tx, mut bob_rx) = mpsc::channel(32);
    let bob_conn = app.state.connection_manager.connect(bob, tx);
    assert!(app.state.connection_manager.subscribe(&bob_conn, space).await);

    let (status, body) = send(
        &app.router,
        post_message(Some(&token_for(alice)), json!({ "content": "  hello space  ", "space_id": space })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "hello space");
    assert_eq!(body["sender_username"], "alice");
    assert_eq!(body["space_id"], space.to_string());
    assert_eq!(body["is_direct_message"], false);

    let frame = next_message(&mut bob_rx).await;
    assert_eq!(frame["id"], body["id"]);
    assert_eq!(frame["content"], "hello space");
}

#[tokio::test]
async fn test_direct_message_reaches_recipient_and_sender_devices() {
    let app = spawn_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    app.store.add_user(alice, "alice");
    app.store.add_user(bob, "bob");

    let (tx, mut bob_rx) = mpsc::channel(32);
    app.state.connection_manager.connect(bob, tx);
    let (tx, mut alice_rx) = mpsc::channel(32);
    app.state.connection_manager.connect(alice, tx);

    let (status, body) = send(
        &app.router,
        post_message(Some(&token_for(alice)), json!({ "content": "psst", "recipient_id": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_direct_message"], true);

    assert_eq!(next_message(&mut bob_rx).await["id"], body["id"]);
    assert_eq!(next_message(&mut alice_rx).await["id"], body["id"]);
}

#[tokio::test]
async fn test_history_returns_messages_oldest_first() {
    let app = spawn_app();
    let alice = Uuid::new_v4();
    let space = Uuid::new_v4();
    app.store.add_user(alice, "alice");
    app.store.add_member(space, alice);
    let token = token_for(alice);

    for content in ["first", "second", "third"] {
        let (status, _) = send(
            &app.router,
            post_message(Some(&token), json!({ "content": content, "space_id": space })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app.router,
        get(&format!("/api/messages?space_id={}", space), Some(&token)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_send_succeeds_with_nobody_connected() {
    let app = spawn_app();
    let alice = Uuid::new_v4();
    let space = Uuid::new_v4();
    app.store.add_user(alice, "alice");
    app.store.add_member(space, alice);

    let (status, _) = send(
        &app.router,
        post_message(Some(&token_for(alice)), json!({ "content": "anyone?", "space_id": space })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.store.message_count().await, 1);
}
