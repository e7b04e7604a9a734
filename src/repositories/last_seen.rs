//! LastSeenRepository - Read watermarks and unread computation

use super::Read;
use crate::entities::LastSeen;
use chrono::{DateTime, Utc};
use sqlx::{Error, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct LastSeenRepository {
    connection_pool: SqlitePool,
}

impl LastSeenRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    /// Move the watermark of (user, room) to `at`, creating it on first use
    #[instrument(skip(self))]
    pub async fn touch(
        &self,
        user_id: i32,
        room_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<LastSeen, Error> {
        sqlx::query(
            r#"
            INSERT INTO room_last_seen (user_id, room_id, last_seen_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id, room_id) DO UPDATE SET last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(user_id)
        .bind(room_id)
        .bind(at)
        .execute(&self.connection_pool)
        .await?;

        Ok(LastSeen {
            user_id,
            room_id: *room_id,
            last_seen_at: at,
        })
    }

    /// A room is unread when a live message from someone else was sent after the watermark.
    /// Without a watermark every such message counts.
    #[instrument(skip(self))]
    pub async fn room_has_unread(&self, user_id: i32, room_id: &Uuid) -> Result<bool, Error> {
        let unread = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM messages m
                LEFT JOIN room_last_seen ls ON ls.room_id = m.room_id AND ls.user_id = ?
                WHERE m.room_id = ?
                  AND m.is_deleted = 0
                  AND m.sender_id != ?
                  AND (ls.last_seen_at IS NULL OR m.sent_at > ls.last_seen_at)
            )
            "#,
        )
        .bind(user_id)
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await?;

        Ok(unread != 0)
    }

    /// Unread messages across every room the user belongs to
    #[instrument(skip(self))]
    pub async fn unread_count(&self, user_id: i32) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM messages m
            JOIN room_members rm ON rm.room_id = m.room_id AND rm.user_id = ?
            LEFT JOIN room_last_seen ls ON ls.room_id = m.room_id AND ls.user_id = rm.user_id
            WHERE m.is_deleted = 0
              AND m.sender_id != rm.user_id
              AND (ls.last_seen_at IS NULL OR m.sent_at > ls.last_seen_at)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await
    }
}

impl Read<LastSeen, (i32, Uuid)> for LastSeenRepository {
    async fn read(&self, id: &(i32, Uuid)) -> Result<Option<LastSeen>, Error> {
        sqlx::query_as::<_, LastSeen>(
            "SELECT user_id, room_id, last_seen_at FROM room_last_seen WHERE user_id = ? AND room_id = ?",
        )
        .bind(id.0)
        .bind(id.1)
        .fetch_optional(&self.connection_pool)
        .await
    }
}
