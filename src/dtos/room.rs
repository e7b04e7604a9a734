//! Room DTOs - Data Transfer Objects for rooms and memberships

use crate::entities::Room;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Struct to handle io with the client
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomDTO {
    pub room_id: Uuid,
    pub room_name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub is_dm: bool,
    pub creator_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<i32>>, // filled in manually when needed
}

impl From<Room> for RoomDTO {
    fn from(value: Room) -> Self {
        Self {
            room_id: value.room_id,
            room_name: value.room_name,
            description: value.description,
            is_private: value.is_private,
            is_dm: value.is_dm,
            creator_id: value.creator_id,
            created_at: value.created_at,
            members: None,
        }
    }
}

/// DTO to create a named (non-DM) room
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct CreateRoomDTO {
    #[validate(length(min = 1, max = 255, message = "Room name must be between 1 and 255 characters"))]
    pub room_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    /// Initial members besides the creator
    #[serde(default)]
    pub member_ids: Vec<i32>,
}

/// DTO to open (or fetch) the DM room with another user
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateDmRoomDTO {
    pub target_user_id: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddMemberDTO {
    pub user_id: i32,
}

/// DTO to create a membership row
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateMembershipDTO {
    pub room_id: Uuid,
    pub user_id: i32,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnreadMessagesDTO {
    pub unread_count: i64,
}

/// Unread state of one room for the caller
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomUnreadDTO {
    pub room_id: Uuid,
    pub has_unread: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomSeenDTO {
    pub room_id: Uuid,
    pub last_seen_at: DateTime<Utc>,
}
