#![allow(dead_code)]

use axum_test::TestServer;
use futures_util::{SinkExt, StreamExt};
use realtime_hub::core::AppState;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub const TEST_JWT_SECRET: &str = "a-test-secret-that-is-long-enough-for-hs256";

/// Users seeded by `fixtures/users.sql`
pub const ALICE: (i32, &str) = (1, "alice");
pub const BOB: (i32, &str) = (2, "bob");
pub const CAROL: (i32, &str) = (3, "carol");

pub type TestSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Create an AppState for the tests, with the in-process bus and presence store
pub fn create_test_state(pool: &SqlitePool) -> Arc<AppState> {
    Arc::new(AppState::in_process(
        pool.clone(),
        TEST_JWT_SECRET.to_string(),
        64,
    ))
}

/// Create a TestServer for the HTTP routes
pub fn create_test_server(state: Arc<AppState>) -> TestServer {
    let app = realtime_hub::create_router(state);
    TestServer::new(app).expect("Failed to create test server")
}

/// Generate a JWT valid for 24 hours
pub fn create_test_jwt(user_id: i32, username: &str, jwt_secret: &str) -> String {
    realtime_hub::core::encode_jwt(username.to_string(), user_id, jwt_secret)
        .expect("Failed to create JWT token")
}

pub fn token_for(user: (i32, &str)) -> String {
    create_test_jwt(user.0, user.1, TEST_JWT_SECRET)
}

pub fn bearer(user: (i32, &str)) -> String {
    format!("Bearer {}", token_for(user))
}

/// Serve the router on an ephemeral port, for the WebSocket tests
pub async fn spawn_test_app(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has an address");
    let app = realtime_hub::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    addr
}

/// Open a WebSocket on `path`, passing the token as a query parameter when given
pub async fn connect_ws(addr: SocketAddr, path: &str, token: Option<&str>) -> TestSocket {
    let url = match token {
        Some(token) => format!("ws://{}{}?token={}", addr, path, token),
        None => format!("ws://{}{}", addr, path),
    };
    let (socket, _) = connect_async(url).await.expect("WebSocket handshake failed");
    socket
}

/// Connect as `user` to `/ws` and wait until the session is active.
///
/// Activation finishes before any inbound frame is read, so a `join_room` for an
/// unknown room answering with an error is used as the readiness check.
pub async fn connect_active(addr: SocketAddr, user: (i32, &str)) -> TestSocket {
    let mut socket = connect_ws(addr, "/ws", Some(&token_for(user))).await;
    send_json(&mut socket, serde_json::json!({"type": "join_room"})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["error"], "room_id is required");
    socket
}

pub async fn send_json(socket: &mut TestSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Next text frame as JSON, failing after two seconds
pub async fn next_json(socket: &mut TestSocket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("Frame is JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

/// Skip frames until one with the given `type` arrives
pub async fn next_event_of(socket: &mut TestSocket, kind: &str) -> Value {
    for _ in 0..32 {
        let frame = next_json(socket).await;
        if frame["type"] == kind {
            return frame;
        }
    }
    panic!("No '{}' frame received", kind);
}

/// Read frames until one of each requested `type` arrived; the first of each is kept.
/// Frames on different groups may interleave in any order.
pub async fn collect_events(socket: &mut TestSocket, kinds: &[&str]) -> HashMap<String, Value> {
    let mut found = HashMap::new();
    for _ in 0..64 {
        if kinds.iter().all(|kind| found.contains_key(*kind)) {
            return found;
        }
        let frame = next_json(socket).await;
        if let Some(kind) = frame["type"].as_str() {
            if kinds.contains(&kind) && !found.contains_key(kind) {
                found.insert(kind.to_string(), frame);
            }
        }
    }
    panic!("Missing frames, got only {:?}", found.keys().collect::<Vec<_>>());
}

/// Poll `check` until it holds, for up to two seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Condition not reached in time");
}

/// Assert no frame of the given `type` arrives within `millis`
pub async fn assert_no_event_of(socket: &mut TestSocket, kind: &str, millis: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(millis);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, socket.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let frame: Value = serde_json::from_str(&text).expect("Frame is JSON");
                assert_ne!(frame["type"], kind, "Unexpected frame: {}", frame);
            }
            Ok(Some(Ok(_))) => {}
            Ok(_) => return,
        }
    }
}

/// Wait for the close frame and return its code
pub async fn next_close_code(socket: &mut TestSocket) -> u16 {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("Timed out waiting for the close frame");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => return u16::from(close.code),
            Some(Ok(Message::Close(None))) => panic!("Close frame without a code"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("Socket error before the close frame: {:?}", e),
            None => panic!("Socket ended without a close frame"),
        }
    }
}
