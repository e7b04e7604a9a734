//! WebSocket frames - Inbound client frames and outbound server events
//!
//! Both directions use a `{"type": <string>, ...fields}` shape. Outbound events are
//! also the payload carried by the fanout bus, so they must round-trip through JSON.

use crate::dtos::{MessageDTO, NotificationDTO};
use crate::entities::{DeliveryStatus, PresenceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Frames a client may send on an active connection
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom {
        #[serde(default)]
        room_id: Option<Uuid>,
    },
    LeaveRoom {
        #[serde(default)]
        room_id: Option<Uuid>,
    },
    SendMessage {
        #[serde(default)]
        room_id: Option<Uuid>,
        #[serde(default)]
        content: Option<String>,
    },
    Typing {
        #[serde(default)]
        room_id: Option<Uuid>,
        #[serde(default)]
        is_typing: bool,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Message type is required")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

impl ClientFrame {
    pub const KNOWN_TYPES: [&'static str; 4] = ["join_room", "leave_room", "send_message", "typing"];

    /// Parse a text frame, telling apart broken JSON, unknown types and bad fields
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;

        match value.get("type").and_then(Value::as_str) {
            None => return Err(FrameError::MissingType),
            Some(kind) if !Self::KNOWN_TYPES.contains(&kind) => {
                return Err(FrameError::UnknownType(kind.to_string()));
            }
            Some(_) => {}
        }

        serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

/// Events rendered to clients; most of them travel through the fanout bus first
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomJoined {
        room_id: Uuid,
        room_name: String,
    },
    RoomLeft {
        room_id: Uuid,
    },
    MessageSent {
        message_id: Uuid,
        room_id: Uuid,
        status: DeliveryStatus,
    },
    ChatMessage {
        message: MessageDTO,
    },
    MessageEdited {
        message_id: Uuid,
        new_content: String,
        edited_at: DateTime<Utc>,
        room_id: Uuid,
        sender_id: i32,
        sender_full_name: String,
    },
    MessageDeleted {
        message_id: Uuid,
        room_id: Uuid,
        edited_at: DateTime<Utc>,
    },
    TypingIndicator {
        user: String,
        user_id: i32,
        room: String,
        room_id: Uuid,
        is_typing: bool,
    },
    UserStatusChanged {
        user_id: i32,
        full_name: String,
        status: PresenceStatus,
    },
    RoomListUpdate {
        room_id: Uuid,
        room_name: String,
        is_dm: bool,
        has_unread: bool,
        latest_message: MessageDTO,
    },
    NewNotification(NotificationDTO),
    MemberAdded {
        user_id: i32,
        full_name: String,
        room_id: Uuid,
        added_by: i32,
        added_by_name: String,
    },
    MemberRemoved {
        user_id: i32,
        full_name: String,
        room_id: Uuid,
        removed_by: i32,
        removed_by_name: String,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::RoomJoined { .. } => "room_joined",
            ServerEvent::RoomLeft { .. } => "room_left",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::ChatMessage { .. } => "chat_message",
            ServerEvent::MessageEdited { .. } => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::TypingIndicator { .. } => "typing_indicator",
            ServerEvent::UserStatusChanged { .. } => "user_status_changed",
            ServerEvent::RoomListUpdate { .. } => "room_list_update",
            ServerEvent::NewNotification(_) => "new_notification",
            ServerEvent::MemberAdded { .. } => "member_added",
            ServerEvent::MemberRemoved { .. } => "member_removed",
        }
    }

    /// Whether a session owned by `user_id` must drop this event instead of rendering it.
    /// Only typing indicators are filtered: a user never sees their own.
    pub fn is_suppressed_for(&self, user_id: i32) -> bool {
        matches!(self, ServerEvent::TypingIndicator { user_id: typist, .. } if *typist == user_id)
    }
}

/// Error frame sent to the originator of a failed action
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
