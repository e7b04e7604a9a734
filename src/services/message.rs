//! MessageService - Message send pipeline, edit, soft-delete and history
//!
//! Persistence and fanout are not transactional: once a message is stored, a failed
//! publish is logged and the message stays. Clients catch up through the history.

use crate::core::AppError;
use crate::core::auth::Identity;
use crate::dtos::{
    CreateMessageDTO, CreateNotificationDTO, MessageDTO, MessagesQuery, ServerEvent,
    UpdateMessageDTO, UserSummaryDTO,
};
use crate::entities::{MessageType, NotificationType, Room};
use crate::fanout::{FanoutBus, GroupName};
use crate::repositories::{
    Create, MembershipRepository, MessageRepository, Read, ReadMany, UserRepository,
};
use crate::services::NotificationService;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const PREVIEW_CHARS: usize = 50;
const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 100;

/// First 50 characters of the content, with an ellipsis when something was cut
pub fn message_preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[derive(Clone)]
pub struct MessageService {
    msg: MessageRepository,
    user: UserRepository,
    membership: MembershipRepository,
    notifications: NotificationService,
    bus: Arc<dyn FanoutBus>,
}

impl MessageService {
    pub fn new(
        msg: MessageRepository,
        user: UserRepository,
        membership: MembershipRepository,
        notifications: NotificationService,
        bus: Arc<dyn FanoutBus>,
    ) -> Self {
        Self {
            msg,
            user,
            membership,
            notifications,
            bus,
        }
    }

    /// Persist a text message and publish `chat_message` to the room group.
    /// The sender's own sessions receive the echo like every other subscriber.
    #[instrument(skip(self, sender, room, content), fields(user_id = sender.user_id, room_id = %room.room_id))]
    pub async fn send(
        &self,
        sender: &Identity,
        room: &Room,
        content: &str,
    ) -> Result<MessageDTO, AppError> {
        let data = CreateMessageDTO {
            room_id: room.room_id,
            sender_id: sender.user_id,
            content: content.to_string(),
            message_type: MessageType::Text,
            file: None,
            sent_at: Utc::now(),
        };
        data.validate()?;

        let message = self.msg.create(&data).await?;
        let rendered = MessageDTO::render(message, UserSummaryDTO::from(sender));
        info!(message_id = %rendered.message_id, "Message stored");

        self.publish(
            &GroupName::room(&room.room_id),
            &ServerEvent::ChatMessage {
                message: rendered.clone(),
            },
        )
        .await;

        Ok(rendered)
    }

    /// Tell every member about the new latest message through their per-user group,
    /// and notify everyone but the sender.
    #[instrument(skip(self, room, message), fields(room_id = %room.room_id, message_id = %message.message_id))]
    pub async fn fan_out(&self, room: &Room, message: &MessageDTO) -> Result<(), AppError> {
        let members = self.membership.members_of_room(&room.room_id).await?;
        let sender = &message.sender;
        let preview = message_preview(&message.content);

        for member in members {
            self.publish(
                &GroupName::user(member),
                &ServerEvent::RoomListUpdate {
                    room_id: room.room_id,
                    room_name: room.room_name.clone(),
                    is_dm: room.is_dm,
                    has_unread: member != sender.id,
                    latest_message: message.clone(),
                },
            )
            .await;

            if member == sender.id {
                continue;
            }

            let notification = CreateNotificationDTO {
                user_id: member,
                notification_type: NotificationType::Message,
                title: format!("New message from {}", sender.full_name),
                message: format!("{} in {}: {}", sender.full_name, room.room_name, preview),
                related_object_id: Some(room.room_id),
            };
            match self.notifications.create(&notification).await {
                Ok(notification) => self.notifications.deliver(&notification).await,
                Err(e) => warn!(member, "Failed to create message notification: {}", e),
            }
        }

        debug!("Message fanned out to room members");
        Ok(())
    }

    #[instrument(skip(self, actor, data), fields(user_id = actor.user_id))]
    pub async fn edit(
        &self,
        actor: &Identity,
        message_id: Uuid,
        data: &UpdateMessageDTO,
    ) -> Result<MessageDTO, AppError> {
        data.validate()?;

        let message = self
            .msg
            .read(&message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found"))?;

        if message.sender_id != actor.user_id {
            warn!("Edit attempted on someone else's message");
            return Err(AppError::forbidden("You can only edit your own messages"));
        }
        if message.is_deleted {
            return Err(AppError::bad_request("You cannot edit a deleted message"));
        }

        let edited_at = Utc::now();
        // the row may have been deleted since the read above
        let updated = self
            .msg
            .edit_content(&message_id, &data.content, edited_at)
            .await?
            .ok_or_else(|| AppError::bad_request("You cannot edit a deleted message"))?;

        self.publish(
            &GroupName::room(&updated.room_id),
            &ServerEvent::MessageEdited {
                message_id,
                new_content: updated.content.clone(),
                edited_at,
                room_id: updated.room_id,
                sender_id: actor.user_id,
                sender_full_name: actor.full_name.clone(),
            },
        )
        .await;

        info!(message_id = %message_id, "Message edited");
        Ok(MessageDTO::render(updated, UserSummaryDTO::from(actor)))
    }

    /// Soft-delete: the content becomes the tombstone and the row stays
    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn delete(&self, actor: &Identity, message_id: Uuid) -> Result<MessageDTO, AppError> {
        let message = self
            .msg
            .read(&message_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(|| AppError::not_found("Message not found or already deleted"))?;

        if message.sender_id != actor.user_id {
            warn!("Delete attempted on someone else's message");
            return Err(AppError::forbidden("You can only delete your own messages"));
        }

        let deleted_at = Utc::now();
        let deleted = self
            .msg
            .soft_delete(&message_id, deleted_at)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found or already deleted"))?;

        self.publish(
            &GroupName::room(&deleted.room_id),
            &ServerEvent::MessageDeleted {
                message_id,
                room_id: deleted.room_id,
                edited_at: deleted_at,
            },
        )
        .await;

        Ok(MessageDTO::render(deleted, UserSummaryDTO::from(actor)))
    }

    /// Newest first; the caller must already be known to be a member
    #[instrument(skip(self, query))]
    pub async fn history(
        &self,
        room_id: Uuid,
        query: &MessagesQuery,
    ) -> Result<Vec<MessageDTO>, AppError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let messages = self
            .msg
            .find_page(&room_id, query.before.as_ref(), limit)
            .await?;

        let mut sender_ids: Vec<i32> = messages.iter().map(|m| m.sender_id).collect();
        sender_ids.sort_unstable();
        sender_ids.dedup();

        let senders: HashMap<i32, UserSummaryDTO> = self
            .user
            .read_many(&sender_ids)
            .await?
            .iter()
            .map(|u| (u.user_id, UserSummaryDTO::from(u)))
            .collect();

        Ok(messages
            .into_iter()
            .map(|m| {
                let sender = senders.get(&m.sender_id).cloned().unwrap_or(UserSummaryDTO {
                    id: m.sender_id,
                    full_name: String::new(),
                });
                MessageDTO::render(m, sender)
            })
            .collect())
    }

    async fn publish(&self, group: &GroupName, event: &ServerEvent) {
        if let Err(e) = self.bus.publish(group, event).await {
            warn!(group = %group, kind = event.kind(), "Publish failed: {}", e);
        }
    }
}
