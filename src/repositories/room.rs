//! RoomRepository - Repository for rooms

use super::Read;
use crate::dtos::CreateRoomDTO;
use crate::entities::Room;
use chrono::Utc;
use sqlx::{Error, SqlitePool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct RoomRepository {
    connection_pool: SqlitePool,
}

impl RoomRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    /// Create a named room; the creator and every listed member join it in the same transaction
    #[instrument(skip(self, data), fields(creator_id = %creator_id))]
    pub async fn create_with_members(
        &self,
        creator_id: i32,
        data: &CreateRoomDTO,
    ) -> Result<Room, Error> {
        debug!("Creating new room");
        let now = Utc::now();
        let room = Room {
            room_id: Uuid::new_v4(),
            room_name: data.room_name.clone(),
            description: data.description.clone(),
            is_private: data.is_private,
            is_dm: false,
            dm_key: None,
            creator_id: Some(creator_id),
            created_at: now,
        };

        let mut tx = self.connection_pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (room_id, room_name, description, is_private, is_dm, dm_key, creator_id, created_at)
            VALUES (?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(room.room_id)
        .bind(&room.room_name)
        .bind(&room.description)
        .bind(room.is_private)
        .bind(creator_id)
        .bind(room.created_at)
        .execute(&mut *tx)
        .await?;

        let mut members = vec![creator_id];
        for id in &data.member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }

        for user_id in &members {
            sqlx::query("INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(room.room_id)
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(room_id = %room.room_id, members = members.len(), "Room created");
        Ok(room)
    }

    /// Return the DM room of the unordered pair, creating it (with both members) if missing.
    ///
    /// The unique `dm_key` makes concurrent calls for the same pair converge on one room:
    /// the losing insert is a no-op and both callers read back the same row.
    #[instrument(skip(self, room_name, description), fields(user_a = %user_a, user_b = %user_b))]
    pub async fn create_or_get_dm(
        &self,
        user_a: i32,
        user_b: i32,
        room_name: &str,
        description: &str,
    ) -> Result<(Room, bool), Error> {
        let dm_key = Room::dm_key_for(user_a, user_b);
        let now = Utc::now();

        let mut tx = self.connection_pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO rooms (room_id, room_name, description, is_private, is_dm, dm_key, creator_id, created_at)
            VALUES (?, ?, ?, 1, 1, ?, ?, ?)
            ON CONFLICT(dm_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_name)
        .bind(description)
        .bind(&dm_key)
        .bind(user_a)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let room = sqlx::query_as::<_, Room>(
            r#"
            SELECT room_id, room_name, description, is_private, is_dm, dm_key, creator_id, created_at
            FROM rooms
            WHERE dm_key = ?
            "#,
        )
        .bind(&dm_key)
        .fetch_one(&mut *tx)
        .await?;

        if inserted {
            for user_id in [user_a, user_b] {
                sqlx::query(
                    "INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)",
                )
                .bind(room.room_id)
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        if inserted {
            info!(room_id = %room.room_id, "DM room created");
        } else {
            debug!(room_id = %room.room_id, "DM room already exists");
        }
        Ok((room, inserted))
    }

    /// Count the DM rooms of a pair; used to check that DMs never duplicate
    pub async fn count_dm_rooms(&self, user_a: i32, user_b: i32) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM rooms r
            WHERE r.is_dm = 1
              AND (SELECT COUNT(*) FROM room_members m WHERE m.room_id = r.room_id) = 2
              AND EXISTS (SELECT 1 FROM room_members m WHERE m.room_id = r.room_id AND m.user_id = ?)
              AND EXISTS (SELECT 1 FROM room_members m WHERE m.room_id = r.room_id AND m.user_id = ?)
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_one(&self.connection_pool)
        .await
    }
}

impl Read<Room, Uuid> for RoomRepository {
    #[instrument(skip(self), fields(room_id = %id))]
    async fn read(&self, id: &Uuid) -> Result<Option<Room>, Error> {
        debug!("Reading room by id");
        sqlx::query_as::<_, Room>(
            r#"
            SELECT room_id, room_name, description, is_private, is_dm, dm_key, creator_id, created_at
            FROM rooms
            WHERE room_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
    }
}
