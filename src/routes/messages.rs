//! Message routes - Edit and soft-delete by the sender

use crate::core::{AppError, AppState, Identity};
use crate::dtos::{MessageDTO, UpdateMessageDTO};
use axum::{
    Extension,
    extract::{Json, Path, State},
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[instrument(skip(state, current_user, body), fields(user_id = %current_user.user_id, message_id = %message_id))]
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<UpdateMessageDTO>,
) -> Result<Json<MessageDTO>, AppError> {
    let message = state
        .message_service
        .edit(&current_user, message_id, &body)
        .await?;
    Ok(Json(message))
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id, message_id = %message_id))]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageDTO>, AppError> {
    let message = state
        .message_service
        .delete(&current_user, message_id)
        .await?;
    Ok(Json(message))
}
