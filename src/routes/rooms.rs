//! Room routes - Rooms, DMs, members, history, unread state and viewers

use crate::core::{AppError, AppState, Identity};
use crate::dtos::{
    AddMemberDTO, CreateDmRoomDTO, CreateRoomDTO, MessageDTO, MessagesQuery, RoomDTO,
    RoomSeenDTO, RoomUnreadDTO, UnreadMessagesDTO, UserSummaryDTO,
};
use axum::{
    Extension,
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use axum_macros::debug_handler;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id))]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Json(body): Json<CreateRoomDTO>,
) -> Result<(StatusCode, Json<RoomDTO>), AppError> {
    debug!("Creating new room");
    let room = state.room_service.create_room(&current_user, &body).await?;
    info!(room_id = %room.room_id, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

#[debug_handler]
#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id))]
pub async fn create_dm_room(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Json(body): Json<CreateDmRoomDTO>,
) -> Result<Json<RoomDTO>, AppError> {
    let room = state
        .room_service
        .create_or_get_dm_room(&current_user, body.target_user_id)
        .await?;
    Ok(Json(room))
}

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id, room_id = %room_id))]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(room_id): Path<Uuid>,
    Json(body): Json<AddMemberDTO>,
) -> Result<StatusCode, AppError> {
    state
        .room_service
        .add_member(&current_user, room_id, body.user_id)
        .await?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path((room_id, member_id)): Path<(Uuid, i32)>,
) -> Result<StatusCode, AppError> {
    state
        .room_service
        .remove_member(&current_user, room_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, current_user, params), fields(user_id = %current_user.user_id, room_id = %room_id))]
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(room_id): Path<Uuid>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageDTO>>, AppError> {
    state
        .room_service
        .require_member(&room_id, current_user.user_id)
        .await?;
    let messages = state.message_service.history(room_id, &params).await?;
    debug!(count = messages.len(), "Messages retrieved");
    Ok(Json(messages))
}

pub async fn mark_room_seen(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSeenDTO>, AppError> {
    let seen = state
        .room_service
        .mark_seen(current_user.user_id, room_id)
        .await?;
    Ok(Json(seen))
}

pub async fn get_room_unread(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomUnreadDTO>, AppError> {
    let has_unread = state
        .room_service
        .room_has_unread(current_user.user_id, &room_id)
        .await?;
    Ok(Json(RoomUnreadDTO {
        room_id,
        has_unread,
    }))
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id, room_id = %room_id))]
pub async fn get_room_presence(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<UserSummaryDTO>>, AppError> {
    state
        .room_service
        .require_member(&room_id, current_user.user_id)
        .await?;
    let viewers = state.presence_service.viewers(&room_id).await?;
    Ok(Json(viewers))
}

pub async fn get_unread_messages(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
) -> Result<Json<UnreadMessagesDTO>, AppError> {
    let unread_count = state
        .room_service
        .unread_count(current_user.user_id)
        .await?;
    Ok(Json(UnreadMessagesDTO { unread_count }))
}
