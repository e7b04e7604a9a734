//! Message DTOs - Data Transfer Objects for messages

use crate::dtos::UserSummaryDTO;
use crate::entities::{Message, MessageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Fully rendered message, as carried by `chat_message` and `room_list_update`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageDTO {
    pub message_id: Uuid,
    pub room_id: Uuid,
    pub content: String,
    pub sender: UserSummaryDTO,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub message_type: MessageType,
    pub file: Option<String>,
}

impl MessageDTO {
    pub fn render(message: Message, sender: UserSummaryDTO) -> Self {
        Self {
            message_id: message.message_id,
            room_id: message.room_id,
            content: message.content,
            sender,
            sent_at: message.sent_at,
            edited_at: message.edited_at,
            is_deleted: message.is_deleted,
            is_edited: message.is_edited,
            message_type: message.message_type,
            file: message.file,
        }
    }
}

/// DTO to create a new message (without message_id)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct CreateMessageDTO {
    pub room_id: Uuid,
    pub sender_id: i32,

    #[validate(length(min = 1, max = 5000, message = "Message content must be between 1 and 5000 characters"))]
    pub content: String,

    pub message_type: MessageType,
    pub file: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// DTO to edit a message (only the content is editable)
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct UpdateMessageDTO {
    #[validate(length(min = 1, max = 5000, message = "Message content must be between 1 and 5000 characters"))]
    pub content: String,
}
