//! Integration tests for the message endpoints
//!
//! Covers:
//! - History pages, newest first, with the `before` cursor
//! - Edit by the sender only, never on a deleted message
//! - Soft delete leaves a tombstone and cannot be repeated

mod common;

#[cfg(test)]
mod message_tests {
    use super::common::*;
    use axum::http::{HeaderName, StatusCode};
    use realtime_hub::core::{AppState, Identity};
    use realtime_hub::dtos::MessageDTO;
    use realtime_hub::entities::Room;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use std::sync::Arc;

    fn auth() -> HeaderName {
        HeaderName::from_static("authorization")
    }

    fn alice() -> Identity {
        Identity {
            user_id: 1,
            username: "alice".to_string(),
            full_name: "Alice Liddell".to_string(),
        }
    }

    /// DM room between alice and bob
    async fn dm_room(state: &Arc<AppState>) -> Room {
        let dto = state
            .room_service
            .create_or_get_dm_room(&alice(), 2)
            .await
            .expect("DM room");
        state
            .room_service
            .find_room(&dto.room_id)
            .await
            .expect("room exists")
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_history_is_newest_first_and_paginated(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let server = create_test_server(state.clone());
        let room = dm_room(&state).await;

        for content in ["one", "two", "three"] {
            state
                .message_service
                .send(&alice(), &room, content)
                .await
                .expect("stored");
        }

        let page: Vec<MessageDTO> = server
            .get(&format!("/rooms/{}/messages", room.room_id))
            .add_header(auth(), bearer(BOB))
            .await
            .json();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
        assert_eq!(page[0].sender.full_name, "Alice Liddell");

        let page: Vec<MessageDTO> = server
            .get(&format!("/rooms/{}/messages", room.room_id))
            .add_query_param("limit", 2)
            .add_header(auth(), bearer(BOB))
            .await
            .json();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].content, "two");

        // Next page strictly before the oldest one seen
        let cursor = page[1]
            .sent_at
            .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true);
        let page: Vec<MessageDTO> = server
            .get(&format!("/rooms/{}/messages", room.room_id))
            .add_query_param("before", cursor)
            .add_header(auth(), bearer(BOB))
            .await
            .json();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one"]);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_only_the_sender_edits(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let server = create_test_server(state.clone());
        let room = dm_room(&state).await;

        let message = state
            .message_service
            .send(&alice(), &room, "helo")
            .await
            .expect("stored");

        let response = server
            .patch(&format!("/messages/{}", message.message_id))
            .add_header(auth(), bearer(BOB))
            .json(&json!({"content": "hijacked"}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(body["error"], "You can only edit your own messages");

        let response = server
            .patch(&format!("/messages/{}", message.message_id))
            .add_header(auth(), bearer(ALICE))
            .json(&json!({"content": "hello"}))
            .await;
        response.assert_status_ok();
        let edited: MessageDTO = response.json();
        assert_eq!(edited.content, "hello");
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());

        let response = server
            .patch(&format!("/messages/{}", uuid::Uuid::new_v4()))
            .add_header(auth(), bearer(ALICE))
            .json(&json!({"content": "nothing"}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_delete_leaves_a_tombstone_once(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let server = create_test_server(state.clone());
        let room = dm_room(&state).await;

        let message = state
            .message_service
            .send(&alice(), &room, "oops")
            .await
            .expect("stored");
        let path = format!("/messages/{}", message.message_id);

        let response = server.delete(&path).add_header(auth(), bearer(BOB)).await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server.delete(&path).add_header(auth(), bearer(ALICE)).await;
        response.assert_status_ok();
        let deleted: MessageDTO = response.json();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, "This message has been deleted");

        // The tombstone stays in the history
        let page: Vec<MessageDTO> = server
            .get(&format!("/rooms/{}/messages", room.room_id))
            .add_header(auth(), bearer(BOB))
            .await
            .json();
        assert_eq!(page.len(), 1);
        assert!(page[0].is_deleted);
        assert_eq!(page[0].content, "This message has been deleted");

        let response = server.delete(&path).add_header(auth(), bearer(ALICE)).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "Message not found or already deleted");

        let response = server
            .patch(&path)
            .add_header(auth(), bearer(ALICE))
            .json(&json!({"content": "revived"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        // Deleted messages no longer count as unread
        let body: Value = server
            .get("/rooms/unread")
            .add_header(auth(), bearer(BOB))
            .await
            .json();
        assert_eq!(body["unread_count"], 0);

        Ok(())
    }
}
