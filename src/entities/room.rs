//! Room entity - Chat room, either a named room or a two-member DM

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Room {
    pub room_id: Uuid,
    pub room_name: String,
    pub description: Option<String>,
    pub is_private: bool,
    // a DM keeps exactly its two members for its whole lifetime
    pub is_dm: bool,
    #[serde(skip_serializing)]
    pub dm_key: Option<String>,
    // nullable: removing the creator does not remove the room
    pub creator_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Key identifying the unordered pair of DM participants
    pub fn dm_key_for(user_a: i32, user_b: i32) -> String {
        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        format!("{}:{}", low, high)
    }
}
