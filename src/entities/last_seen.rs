//! LastSeen entity - Per-user, per-room read watermark

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LastSeen {
    pub user_id: i32,
    pub room_id: Uuid,
    // messages sent strictly after this instant by someone else are unread
    pub last_seen_at: DateTime<Utc>,
}
