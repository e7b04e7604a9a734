//! Notification entity - Per-user notification with read state

use super::enums::NotificationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: i32,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_object_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
