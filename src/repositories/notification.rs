//! NotificationRepository - Notification store

use super::{Create, Read};
use crate::dtos::CreateNotificationDTO;
use crate::entities::Notification;
use chrono::Utc;
use sqlx::{Error, SqlitePool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct NotificationRepository {
    connection_pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    /// Notifications of a user, newest first
    #[instrument(skip(self))]
    pub async fn find_many_by_user_id(
        &self,
        user_id: i32,
        limit: i64,
    ) -> Result<Vec<Notification>, Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, user_id, notification_type, title, message,
                   related_object_id, is_read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.connection_pool)
        .await
    }

    /// Flip a notification of `user_id` to read
    ///
    /// # Returns
    /// * `Ok(Some(false))` - It was unread and is now read
    /// * `Ok(Some(true))` - It was already read
    /// * `Ok(None)` - No such notification for this user
    #[instrument(skip(self), fields(notification_id = %notification_id))]
    pub async fn mark_read(
        &self,
        user_id: i32,
        notification_id: &Uuid,
    ) -> Result<Option<bool>, Error> {
        let flipped = sqlx::query(
            "UPDATE notifications SET is_read = 1 WHERE notification_id = ? AND user_id = ? AND is_read = 0",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.connection_pool)
        .await?
        .rows_affected();

        if flipped > 0 {
            debug!("Notification marked as read");
            return Ok(Some(false));
        }

        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE notification_id = ? AND user_id = ?",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await?;

        Ok((exists > 0).then_some(true))
    }

    /// Flip every unread notification of a user, returning how many were flipped
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: i32) -> Result<u64, Error> {
        let marked = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(&self.connection_pool)
            .await?
            .rows_affected();

        info!(marked, "Notifications marked as read");
        Ok(marked)
    }

    pub async fn unread_count(&self, user_id: i32) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await
    }
}

impl Create<Notification, CreateNotificationDTO> for NotificationRepository {
    #[instrument(skip(self, data), fields(user_id = data.user_id, kind = ?data.notification_type))]
    async fn create(&self, data: &CreateNotificationDTO) -> Result<Notification, Error> {
        let notification = Notification {
            notification_id: Uuid::new_v4(),
            user_id: data.user_id,
            notification_type: data.notification_type,
            title: data.title.clone(),
            message: data.message.clone(),
            related_object_id: data.related_object_id,
            is_read: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (notification_id, user_id, notification_type, title, message, related_object_id, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(notification.notification_id)
        .bind(notification.user_id)
        .bind(notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.related_object_id)
        .bind(notification.created_at)
        .execute(&self.connection_pool)
        .await?;

        debug!(notification_id = %notification.notification_id, "Notification persisted");
        Ok(notification)
    }
}

impl Read<Notification, Uuid> for NotificationRepository {
    async fn read(&self, id: &Uuid) -> Result<Option<Notification>, Error> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, user_id, notification_type, title, message,
                   related_object_id, is_read, created_at
            FROM notifications
            WHERE notification_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
    }
}
