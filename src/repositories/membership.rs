//! MembershipRepository - Membership resolver
//!
//! Single source of truth for "who belongs to this room" and "which rooms does this
//! user belong to". Sessions only cache what they joined; every join is checked here.

use super::{Create, Delete, Read};
use crate::dtos::CreateMembershipDTO;
use crate::entities::Membership;
use sqlx::{Error, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct MembershipRepository {
    connection_pool: SqlitePool,
}

impl MembershipRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    #[instrument(skip(self))]
    pub async fn is_member(&self, room_id: &Uuid, user_id: i32) -> Result<bool, Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM room_members WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.connection_pool)
        .await?;

        Ok(count > 0)
    }

    /// Ids of every member of a room, connected or not
    #[instrument(skip(self))]
    pub async fn members_of_room(&self, room_id: &Uuid) -> Result<Vec<i32>, Error> {
        let members = sqlx::query_scalar::<_, i32>(
            "SELECT user_id FROM room_members WHERE room_id = ? ORDER BY joined_at ASC",
        )
        .bind(room_id)
        .fetch_all(&self.connection_pool)
        .await?;

        debug!(count = members.len(), "Room members loaded");
        Ok(members)
    }

    /// Ids of every room a user belongs to
    #[instrument(skip(self))]
    pub async fn rooms_of_user(&self, user_id: i32) -> Result<Vec<Uuid>, Error> {
        let rooms = sqlx::query_scalar::<_, Uuid>(
            "SELECT room_id FROM room_members WHERE user_id = ? ORDER BY joined_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.connection_pool)
        .await?;

        debug!(count = rooms.len(), "User rooms loaded");
        Ok(rooms)
    }
}

impl Create<Membership, CreateMembershipDTO> for MembershipRepository {
    #[instrument(skip(self, data), fields(room_id = %data.room_id, user_id = data.user_id))]
    async fn create(&self, data: &CreateMembershipDTO) -> Result<Membership, Error> {
        sqlx::query("INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(data.room_id)
            .bind(data.user_id)
            .bind(data.joined_at)
            .execute(&self.connection_pool)
            .await?;

        Ok(Membership {
            room_id: data.room_id,
            user_id: data.user_id,
            joined_at: data.joined_at,
        })
    }
}

impl Read<Membership, (Uuid, i32)> for MembershipRepository {
    async fn read(&self, id: &(Uuid, i32)) -> Result<Option<Membership>, Error> {
        sqlx::query_as::<_, Membership>(
            "SELECT room_id, user_id, joined_at FROM room_members WHERE room_id = ? AND user_id = ?",
        )
        .bind(id.0)
        .bind(id.1)
        .fetch_optional(&self.connection_pool)
        .await
    }
}

impl Delete<(Uuid, i32)> for MembershipRepository {
    #[instrument(skip(self), fields(room_id = %id.0, user_id = id.1))]
    async fn delete(&self, id: &(Uuid, i32)) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(id.0)
            .bind(id.1)
            .execute(&self.connection_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
