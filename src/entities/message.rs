//! Message entity - Chat message, soft-deleted only

use super::enums::MessageType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content written over a message when it is deleted
pub const TOMBSTONE: &str = "This message has been deleted";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Message {
    pub message_id: Uuid,
    pub room_id: Uuid,
    pub sender_id: i32,
    pub content: String,
    pub message_type: MessageType,
    pub file: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
}
