//! NotificationService - Persist and deliver per-user notifications

use crate::core::AppError;
use crate::dtos::{
    CreateNotificationDTO, MarkAllReadDTO, MarkReadDTO, NotificationDTO, ServerEvent,
};
use crate::entities::{Notification, NotificationType};
use crate::fanout::{FanoutBus, GroupName};
use crate::repositories::{Create, NotificationRepository};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 100;

#[derive(Clone)]
pub struct NotificationService {
    notification: NotificationRepository,
    bus: Arc<dyn FanoutBus>,
}

impl NotificationService {
    pub fn new(notification: NotificationRepository, bus: Arc<dyn FanoutBus>) -> Self {
        Self { notification, bus }
    }

    #[instrument(skip(self, data), fields(user_id = data.user_id))]
    pub async fn create(&self, data: &CreateNotificationDTO) -> Result<Notification, AppError> {
        data.validate()?;
        let notification = self.notification.create(data).await?;
        debug!(notification_id = %notification.notification_id, "Notification created");
        Ok(notification)
    }

    /// Push a persisted notification to the recipient's live sessions.
    ///
    /// Fire-and-forget: a missing subscriber or a bus failure is only logged, the
    /// notification stays readable from storage either way.
    #[instrument(skip(self, notification), fields(user_id = notification.user_id, notification_id = %notification.notification_id))]
    pub async fn deliver(&self, notification: &Notification) {
        let event = ServerEvent::NewNotification(NotificationDTO::from(notification.clone()));
        match self
            .bus
            .publish(&GroupName::user(notification.user_id), &event)
            .await
        {
            Ok(()) => debug!("Notification pushed"),
            Err(e) => warn!("Notification push failed: {}", e),
        }
    }

    /// Entry point for domain event producers such as the booking workflow
    #[instrument(skip(self, title, message))]
    pub async fn create_and_deliver(
        &self,
        user_id: i32,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        related_object_id: Option<Uuid>,
    ) -> Result<Notification, AppError> {
        let notification = self
            .create(&CreateNotificationDTO {
                user_id,
                notification_type,
                title: title.into(),
                message: message.into(),
                related_object_id,
            })
            .await?;
        self.deliver(&notification).await;
        Ok(notification)
    }

    pub async fn list(
        &self,
        user_id: i32,
        limit: Option<i64>,
    ) -> Result<Vec<NotificationDTO>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let notifications = self
            .notification
            .find_many_by_user_id(user_id, limit)
            .await?;
        Ok(notifications.into_iter().map(NotificationDTO::from).collect())
    }

    pub async fn unread_count(&self, user_id: i32) -> Result<i64, AppError> {
        Ok(self.notification.unread_count(user_id).await?)
    }

    /// Idempotent: marking an already read notification succeeds and says so
    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        user_id: i32,
        notification_id: Uuid,
    ) -> Result<MarkReadDTO, AppError> {
        let already_read = self
            .notification
            .mark_read(user_id, &notification_id)
            .await?
            .ok_or_else(|| {
                warn!("Notification not found for user");
                AppError::not_found("Notification not found")
            })?;

        let message = if already_read {
            "Notification was already marked as read"
        } else {
            "Notification marked as read successfully"
        };

        Ok(MarkReadDTO {
            notification_id,
            is_read: true,
            already_read,
            message: message.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: i32) -> Result<MarkAllReadDTO, AppError> {
        let marked_count = self.notification.mark_all_read(user_id).await?;
        let unread_count = self.notification.unread_count(user_id).await?;
        info!(marked_count, unread_count, "All notifications marked as read");

        Ok(MarkAllReadDTO {
            message: format!("{marked_count} notification marked as read"),
            marked_count,
            unread_count,
        })
    }
}
