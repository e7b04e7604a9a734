//! WebSocket Module - Real-time hub
//!
//! Handles the persistent client connections:
//! - HTTP -> WebSocket upgrade and identity check
//! - Session lifecycle (split reader/writer, guaranteed cleanup)
//! - Inbound frame handlers (join, leave, send, typing)
//! - Registry of the live sessions of this process

pub mod connection;
pub mod event_handlers;
pub mod registry;

pub use connection::handle_socket;
pub use event_handlers::{Session, SessionState};
pub use registry::{InternalSignal, SessionRegistry};

use crate::AppState;
use crate::core::auth::{Identity, authenticate_token, bearer_token};
use crate::dtos::WsAuthQuery;
use axum::{
    extract::{Path, Query, State, ws::WebSocketUpgrade},
    http::{HeaderMap, header},
    response::Response,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Close codes sent by the hub
pub mod close_codes {
    pub const NOT_FOUND: u16 = 4000;
    pub const UNAUTHORIZED: u16 = 4001;
    pub const FORBIDDEN: u16 = 4003;
    pub const INTERNAL: u16 = 1011;
}

/// Entry point for the user-scoped connection (`/ws`)
///
/// The upgrade is always accepted; a connection without a verified identity is closed
/// right away with [`close_codes::UNAUTHORIZED`].
#[instrument(skip_all)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    let identity = resolve_identity(&state, &headers, &query).await;
    upgrade(ws, state, identity, None)
}

/// Entry point for the room-scoped connection (`/ws/chat/{room_id}`): same session,
/// joined to the room once active
#[instrument(skip_all)]
pub async fn ws_room_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    let identity = resolve_identity(&state, &headers, &query).await;
    upgrade(ws, state, identity, Some(room_id))
}

fn upgrade(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    identity: Option<Identity>,
    auto_join: Option<String>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        match identity {
            Some(identity) => handle_socket(socket, state, identity, auto_join).await,
            None => {
                connection::reject(socket, close_codes::UNAUTHORIZED, "Unauthorized").await;
            }
        }
    })
}

/// Token from `Authorization: Bearer` or, for browsers, from `?token=`
async fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
    query: &WsAuthQuery,
) -> Option<Identity> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .or(query.token.as_deref())?;

    match authenticate_token(state, token).await {
        Ok(identity) => Some(identity),
        Err(e) => {
            warn!("WebSocket authentication failed: {}", e);
            None
        }
    }
}
