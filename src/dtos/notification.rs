//! Notification DTOs - Data Transfer Objects for notifications

use crate::entities::{Notification, NotificationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotificationDTO {
    pub notification_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_object_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl From<Notification> for NotificationDTO {
    fn from(value: Notification) -> Self {
        Self {
            notification_id: value.notification_id,
            notification_type: value.notification_type,
            title: value.title,
            message: value.message,
            related_object_id: value.related_object_id,
            created_at: value.created_at,
            is_read: value.is_read,
        }
    }
}

/// DTO used by the domain event producers (booking workflow, message pipeline)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct CreateNotificationDTO {
    pub user_id: i32,
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub message: String,
    pub related_object_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkReadDTO {
    pub notification_id: Uuid,
    pub is_read: bool,
    pub already_read: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkAllReadDTO {
    pub message: String,
    pub marked_count: u64,
    pub unread_count: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationUnreadCountDTO {
    pub unread_count: i64,
}
