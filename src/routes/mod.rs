//! Routes module - HTTP handlers of the hub
//!
//! Every handler sits behind the authentication middleware and delegates to the services
//! held in `AppState`; the WebSocket entry points live in `ws`.

pub mod messages;
pub mod notifications;
pub mod rooms;

pub use messages::{delete_message, edit_message};
pub use notifications::{
    get_unread_count, list_notifications, mark_all_notifications_read, mark_notification_read,
};
pub use rooms::{
    add_member, create_dm_room, create_room, get_room_messages, get_room_presence,
    get_room_unread, get_unread_messages, mark_room_seen, remove_member,
};

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Root endpoint - health check
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        format!("Hub is running, {} live sessions", state.sessions.online_count()),
    )
}
