//! Real-time messaging hub - library exposing the modules for the binary and the tests

pub mod core;
pub mod dtos;
pub mod entities;
pub mod fanout;
pub mod presence;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod ws;

pub use core::{AppError, AppState, auth, config};

use axum::{
    Router, middleware,
    routing::{any, get, patch, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    use routes::root;
    use ws::{ws_handler, ws_room_handler};

    Router::new()
        .route("/", get(root))
        .route("/ws", any(ws_handler))
        .route("/ws/chat/{room_id}", any(ws_room_handler))
        .nest("/rooms", configure_room_routes(state.clone()))
        .nest("/messages", configure_message_routes(state.clone()))
        .nest("/notifications", configure_notification_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn configure_room_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use routes::*;

    Router::new()
        .route("/", post(create_room))
        .route("/dm", post(create_dm_room))
        .route("/unread", get(get_unread_messages))
        .route("/{room_id}/members", post(add_member))
        .route(
            "/{room_id}/members/{user_id}",
            axum::routing::delete(remove_member),
        )
        .route("/{room_id}/messages", get(get_room_messages))
        .route("/{room_id}/read", post(mark_room_seen))
        .route("/{room_id}/unread", get(get_room_unread))
        .route("/{room_id}/presence", get(get_room_presence))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

fn configure_message_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use routes::*;

    Router::new()
        .route("/{message_id}", patch(edit_message).delete(delete_message))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}

fn configure_notification_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    use core::authentication_middleware;
    use routes::*;

    Router::new()
        .route("/", get(list_notifications))
        .route("/unread", get(get_unread_count))
        .route("/{notification_id}/read", patch(mark_notification_read))
        .route("/read-all", post(mark_all_notifications_read))
        .layer(middleware::from_fn_with_state(
            state,
            authentication_middleware,
        ))
}
