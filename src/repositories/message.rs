//! MessageRepository - Message store
//!
//! Messages are never hard-deleted: a delete writes the tombstone over the content.
//! Edits and deletes only match rows that are not deleted yet, so a concurrent delete
//! always wins over a late edit.

use super::{Create, Read};
use crate::dtos::CreateMessageDTO;
use crate::entities::{Message, TOMBSTONE};
use chrono::{DateTime, Utc};
use sqlx::{Error, SqlitePool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageRepository {
    connection_pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(connection_pool: SqlitePool) -> Self {
        Self { connection_pool }
    }

    /// Page of messages of a room, newest first
    ///
    /// # Arguments
    /// * `before` - Optional upper bound (excluded) to load older pages
    /// * `limit` - Maximum number of messages to return
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub async fn find_page(
        &self,
        room_id: &Uuid,
        before: Option<&DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>, Error> {
        let messages = if let Some(before) = before {
            sqlx::query_as::<_, Message>(
                r#"
                SELECT message_id, room_id, sender_id, content, message_type, file,
                       sent_at, is_deleted, is_edited, edited_at
                FROM messages
                WHERE room_id = ? AND sent_at < ?
                ORDER BY sent_at DESC, rowid DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.connection_pool)
            .await?
        } else {
            sqlx::query_as::<_, Message>(
                r#"
                SELECT message_id, room_id, sender_id, content, message_type, file,
                       sent_at, is_deleted, is_edited, edited_at
                FROM messages
                WHERE room_id = ?
                ORDER BY sent_at DESC, rowid DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(limit)
            .fetch_all(&self.connection_pool)
            .await?
        };

        debug!(count = messages.len(), "Messages page loaded");
        Ok(messages)
    }

    /// Replace the content of a live message
    ///
    /// # Returns
    /// * `Ok(None)` - The message does not exist or is already deleted
    #[instrument(skip(self, content), fields(message_id = %message_id))]
    pub async fn edit_content(
        &self,
        message_id: &Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<Message>, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = ?, is_edited = 1, edited_at = ?
            WHERE message_id = ? AND is_deleted = 0
            "#,
        )
        .bind(content)
        .bind(edited_at)
        .bind(message_id)
        .execute(&self.connection_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.read(message_id).await
    }

    /// Tombstone a live message
    ///
    /// # Returns
    /// * `Ok(None)` - The message does not exist or is already deleted
    #[instrument(skip(self), fields(message_id = %message_id))]
    pub async fn soft_delete(
        &self,
        message_id: &Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<Option<Message>, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = ?, is_deleted = 1, edited_at = ?
            WHERE message_id = ? AND is_deleted = 0
            "#,
        )
        .bind(TOMBSTONE)
        .bind(deleted_at)
        .bind(message_id)
        .execute(&self.connection_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        info!("Message soft-deleted");
        self.read(message_id).await
    }
}

impl Create<Message, CreateMessageDTO> for MessageRepository {
    #[instrument(skip(self, data), fields(room_id = %data.room_id, sender_id = data.sender_id))]
    async fn create(&self, data: &CreateMessageDTO) -> Result<Message, Error> {
        let message = Message {
            message_id: Uuid::new_v4(),
            room_id: data.room_id,
            sender_id: data.sender_id,
            content: data.content.clone(),
            message_type: data.message_type,
            file: data.file.clone(),
            sent_at: data.sent_at,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (message_id, room_id, sender_id, content, message_type, file, sent_at, is_deleted, is_edited, edited_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, NULL)
            "#,
        )
        .bind(message.message_id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type)
        .bind(&message.file)
        .bind(message.sent_at)
        .execute(&self.connection_pool)
        .await?;

        debug!(message_id = %message.message_id, "Message persisted");
        Ok(message)
    }
}

impl Read<Message, Uuid> for MessageRepository {
    async fn read(&self, id: &Uuid) -> Result<Option<Message>, Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT message_id, room_id, sender_id, content, message_type, file,
                   sent_at, is_deleted, is_edited, edited_at
            FROM messages
            WHERE message_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
    }
}
