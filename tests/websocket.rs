//! WebSocket end-to-end tests
//!
//! Serves the full router on a local port and talks to it with a real
//! WebSocket client, so upgrades, control frames, pings and server-side
//! closes all cross an actual socket.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use spaces_chat_service::auth::Claims;
use spaces_chat_service::config::{
    DatabaseConfig, DeliveryConfig, JwtConfig, OtelConfig, ServerConfig, Settings,
    WebSocketConfig,
};
use spaces_chat_service::server::{create_app, AppState};
use spaces_chat_service::store::MemoryChatStore;

const SECRET: &str = "websocket-test-secret";

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ============================================================================
// Helpers
// ============================================================================

struct TestServer {
    addr: std::net::SocketAddr,
    state: AppState,
    store: Arc<MemoryChatStore>,
    _shutdown: broadcast::Sender<()>,
}

/// Short liveness timings: a ping every second, idle limit of two seconds
fn settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        database: DatabaseConfig::default(),
        websocket: WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 2,
            cleanup_interval: 1,
            ..Default::default()
        },
        delivery: DeliveryConfig::default(),
        otel: OtelConfig::default(),
    }
}

async fn spawn_server() -> TestServer {
    spawn_server_with(settings()).await
}

async fn spawn_server_with(settings: Settings) -> TestServer {
    let store = Arc::new(MemoryChatStore::new());
    let (state, channels) = AppState::new(settings, store.clone());
    let (shutdown_tx, _) = broadcast::channel(1);
    state.spawn_workers(channels, &shutdown_tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
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

async fn connect(server: &TestServer, user_id: Uuid) -> Client {
    let url = format!("ws://{}/ws?token={}", server.addr, token_for(user_id));
    let (client, _) = connect_async(url).await.expect("upgrade should succeed");
    client
}

/// Next text frame as JSON, skipping pings
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no frame in time")
            .expect("socket ended")
            .expect("socket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn subscribe(client: &mut Client, space: Uuid) -> Value {
    let frame = json!({ "type": "subscribe", "space_id": space, "subscribe": true });
    client.send(Message::text(frame.to_string())).await.unwrap();
    next_json(client).await
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_upgrade_without_token_is_refused() {
    let server = spawn_server().await;

    let result = connect_async(format!("ws://{}/ws", server.addr)).await;

    assert!(result.is_err());
    assert_eq!(server.state.connection_manager.connection_count(), 0);
}

#[tokio::test]
async fn test_welcome_then_subscribe_round_trip() {
    let server = spawn_server().await;
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    server.store.add_user(user, "alice");
    server.store.add_member(space, user);

    let mut client = connect(&server, user).await;

    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "system");
    assert_eq!(welcome["message"], "Connected to chat server");

    let confirm = subscribe(&mut client, space).await;
    assert_eq!(confirm["type"], "subscribe_confirm");
    assert_eq!(confirm["space_id"], space.to_string());
    assert_eq!(confirm["status"], "subscribed");
    assert_eq!(server.state.connection_manager.space_connections(space).len(), 1);
}

#[tokio::test]
async fn test_zero_channel_buffer_still_serves() {
    let mut config = settings();
    config.websocket.channel_buffer_size = 0;
    let server = spawn_server_with(config).await;
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    server.store.add_user(user, "alice");
    server.store.add_member(space, user);

    let mut client = connect(&server, user).await;

    assert_eq!(next_json(&mut client).await["type"], "system");
    assert_eq!(subscribe(&mut client, space).await["status"], "subscribed");
}

#[tokio::test]
async fn test_listening_client_outlives_idle_limit() {
    let server = spawn_server().await;
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    server.store.add_user(user, "alice");
    server.store.add_member(space, user);

    let mut client = connect(&server, user).await;
    next_json(&mut client).await;
    assert_eq!(subscribe(&mut client, space).await["status"], "subscribed");

    // Only read from here on. The client library answers each ping with a
    // pong while it reads, which is all the server hears from this client.
    let mut pings = 0;
    let listen_until = tokio::time::Instant::now() + Duration::from_secs(5);
    while let Ok(frame) = tokio::time::timeout_at(listen_until, client.next()).await {
        match frame {
            Some(Ok(Message::Ping(_))) => pings += 1,
            Some(Ok(Message::Close(_))) | None => panic!("server closed a listening client"),
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("socket error: {}", e),
        }
    }

    assert!(pings >= 2, "expected periodic pings, saw {}", pings);
    assert!(server.state.connection_manager.is_user_online(user));
    assert_eq!(server.state.connection_manager.space_connections(space).len(), 1);
}

#[tokio::test]
async fn test_evicted_connection_socket_closes() {
    let server = spawn_server().await;
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    server.store.add_user(user, "alice");
    server.store.add_member(space, user);

    let mut client = connect(&server, user).await;
    next_json(&mut client).await;
    assert_eq!(subscribe(&mut client, space).await["status"], "subscribed");

    let manager = server.state.connection_manager.clone();
    let handle = manager.user_connections(user).pop().expect("connection registered");
    assert!(server.state.evictor.evict(handle, "closed"));

    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket should close after eviction");

    assert!(wait_until(|| !manager.is_user_online(user)).await);
    assert!(manager.space_connections(space).is_empty());
    let stats = manager.stats();
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.total_subscriptions, 0);
    assert_eq!(stats.active_spaces, 0);
}

#[tokio::test]
async fn test_client_close_removes_connection() {
    let server = spawn_server().await;
    let user = Uuid::new_v4();
    let space = Uuid::new_v4();
    server.store.add_user(user, "alice");
    server.store.add_member(space, user);

    let mut client = connect(&server, user).await;
    next_json(&mut client).await;
    subscribe(&mut client, space).await;

    client.close(None).await.unwrap();

    let manager = server.state.connection_manager.clone();
    assert!(wait_until(|| manager.connection_count() == 0).await);
    assert!(manager.space_connections(space).is_empty());
}
