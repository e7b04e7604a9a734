//! Notification routes - Listing and read state

use crate::core::{AppError, AppState, Identity};
use crate::dtos::{MarkAllReadDTO, MarkReadDTO, NotificationDTO, NotificationUnreadCountDTO, NotificationsQuery};
use axum::{
    Extension,
    extract::{Json, Path, Query, State},
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[instrument(skip(state, current_user, params), fields(user_id = %current_user.user_id))]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Query(params): Query<NotificationsQuery>,
) -> Result<Json<Vec<NotificationDTO>>, AppError> {
    let notifications = state
        .notification_service
        .list(current_user.user_id, params.limit)
        .await?;
    Ok(Json(notifications))
}

pub async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
) -> Result<Json<NotificationUnreadCountDTO>, AppError> {
    let unread_count = state
        .notification_service
        .unread_count(current_user.user_id)
        .await?;
    Ok(Json(NotificationUnreadCountDTO { unread_count }))
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id, notification_id = %notification_id))]
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<MarkReadDTO>, AppError> {
    let result = state
        .notification_service
        .mark_read(current_user.user_id, notification_id)
        .await?;
    Ok(Json(result))
}

#[instrument(skip(state, current_user), fields(user_id = %current_user.user_id))]
pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<Identity>,
) -> Result<Json<MarkAllReadDTO>, AppError> {
    let result = state
        .notification_service
        .mark_all_read(current_user.user_id)
        .await?;
    Ok(Json(result))
}
