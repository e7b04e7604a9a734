//! Membership entity - (room, user) pair, unique per pair

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Membership {
    pub room_id: Uuid,
    pub user_id: i32,
    pub joined_at: DateTime<Utc>,
}
