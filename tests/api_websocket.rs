//! Integration tests for the WebSocket hub
//!
//! Covers:
//! - Connection refusal (missing identity, unknown room, not a member)
//! - Malformed frames answered with an error while the connection stays open
//! - Room join/leave, message echo and ordering, typing suppression
//! - Room list updates, notifications and presence announcements
//! - Cleanup of the session registry and of global presence on close
//!
//! Every test serves the router on an ephemeral port and talks to it with a real
//! WebSocket client.

mod common;

#[cfg(test)]
mod ws_tests {
    use super::common::*;
    use axum::http::HeaderName;
    use futures_util::{SinkExt, StreamExt};
    use realtime_hub::core::{AppState, Identity};
    use realtime_hub::entities::PresenceStatus;
    use realtime_hub::fanout::GroupName;
    use realtime_hub::ws::Session;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_tungstenite::tungstenite::Message;
    use uuid::Uuid;

    fn alice() -> Identity {
        Identity {
            user_id: 1,
            username: "alice".to_string(),
            full_name: "Alice Liddell".to_string(),
        }
    }

    async fn dm_room_id(state: &Arc<AppState>) -> Uuid {
        state
            .room_service
            .create_or_get_dm_room(&alice(), 2)
            .await
            .expect("DM room")
            .room_id
    }

    async fn join(socket: &mut TestSocket, room_id: Uuid) {
        send_json(socket, json!({"type": "join_room", "room_id": room_id})).await;
        let joined = next_event_of(socket, "room_joined").await;
        assert_eq!(joined["room_id"], json!(room_id));
    }

    // ============================================================
    // Connection refusal
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_connection_without_identity_is_closed_4001(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;

        let mut socket = connect_ws(addr, "/ws", None).await;
        assert_eq!(next_close_code(&mut socket).await, 4001);

        let mut socket = connect_ws(addr, "/ws", Some("not-a-token")).await;
        assert_eq!(next_close_code(&mut socket).await, 4001);

        // A valid token for a user the hub does not know
        let token = create_test_jwt(999, "ghost", TEST_JWT_SECRET);
        let mut socket = connect_ws(addr, "/ws", Some(&token)).await;
        assert_eq!(next_close_code(&mut socket).await, 4001);

        assert_eq!(state.sessions.online_count(), 0);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_room_scoped_connection_close_codes(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut socket = connect_ws(addr, "/ws/chat/not-a-uuid", Some(&token_for(ALICE))).await;
        assert_eq!(next_close_code(&mut socket).await, 4000);

        let path = format!("/ws/chat/{}", Uuid::new_v4());
        let mut socket = connect_ws(addr, &path, Some(&token_for(ALICE))).await;
        assert_eq!(next_close_code(&mut socket).await, 4000);

        let path = format!("/ws/chat/{}", room_id);
        let mut socket = connect_ws(addr, &path, Some(&token_for(CAROL))).await;
        assert_eq!(next_close_code(&mut socket).await, 4003);

        let mut socket = connect_ws(addr, &path, Some(&token_for(BOB))).await;
        let joined = next_event_of(&mut socket, "room_joined").await;
        assert_eq!(joined["room_id"], json!(room_id));
        assert_eq!(joined["room_name"], "DM: Alice Liddell & Bob Marley");

        Ok(())
    }

    // ============================================================
    // Inbound frame handling
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_malformed_frames_keep_the_connection_open(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;
        let mut socket = connect_active(addr, ALICE).await;

        socket
            .send(Message::Text("{ this is not valid json at all }".to_string()))
            .await
            .expect("sent");
        assert_eq!(next_json(&mut socket).await["error"], "Invalid JSON format");

        send_json(&mut socket, json!({"room_id": room_id})).await;
        assert_eq!(next_json(&mut socket).await["error"], "Message type is required");

        send_json(&mut socket, json!({"type": "dance"})).await;
        assert_eq!(next_json(&mut socket).await["error"], "Unknown message type: dance");

        socket
            .send(Message::Binary(vec![1, 2, 3]))
            .await
            .expect("sent");
        assert_eq!(next_json(&mut socket).await["error"], "Invalid JSON format");

        send_json(&mut socket, json!({"type": "send_message", "room_id": room_id})).await;
        assert_eq!(
            next_json(&mut socket).await["error"],
            "room_id and content are required"
        );

        send_json(
            &mut socket,
            json!({"type": "send_message", "room_id": room_id, "content": "too early"}),
        )
        .await;
        assert_eq!(next_json(&mut socket).await["error"], "You must join the room first");

        // Still usable after every rejection
        join(&mut socket, room_id).await;
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_join_requires_membership(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;
        let mut carol = connect_active(addr, CAROL).await;

        send_json(&mut carol, json!({"type": "join_room", "room_id": room_id})).await;
        assert_eq!(next_json(&mut carol).await["error"], "Not authorized to join this room");

        send_json(&mut carol, json!({"type": "join_room", "room_id": Uuid::new_v4()})).await;
        assert_eq!(next_json(&mut carol).await["error"], "Room not found");

        send_json(&mut carol, json!({"type": "leave_room", "room_id": room_id})).await;
        assert_eq!(next_json(&mut carol).await["error"], "You are not in this room");

        Ok(())
    }

    // ============================================================
    // Messaging
    // ============================================================

    /// Alice and Bob share a DM room; Alice sends "hello".
    /// Alice gets the acknowledgement and the echo, Bob gets the message, a room list
    /// update marked unread and a notification.
    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_hello_reaches_every_member(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        join(&mut alice, room_id).await;
        join(&mut bob, room_id).await;

        send_json(
            &mut alice,
            json!({"type": "send_message", "room_id": room_id, "content": "hello"}),
        )
        .await;

        let frames = collect_events(&mut alice, &["message_sent", "chat_message", "room_list_update"]).await;
        let ack = &frames["message_sent"];
        assert_eq!(ack["status"], "delivered");
        assert_eq!(ack["room_id"], json!(room_id));
        let echo = &frames["chat_message"]["message"];
        assert_eq!(echo["content"], "hello");
        assert_eq!(echo["message_id"], ack["message_id"]);
        assert_eq!(frames["room_list_update"]["has_unread"], false);

        let frames = collect_events(&mut bob, &["chat_message", "room_list_update", "new_notification"]).await;
        let message = &frames["chat_message"]["message"];
        assert_eq!(message["content"], "hello");
        assert_eq!(message["sender"]["id"], 1);
        assert_eq!(message["sender"]["full_name"], "Alice Liddell");

        let update = &frames["room_list_update"];
        assert_eq!(update["room_id"], json!(room_id));
        assert_eq!(update["is_dm"], true);
        assert_eq!(update["has_unread"], true);
        assert_eq!(update["latest_message"]["content"], "hello");

        let notification = &frames["new_notification"];
        assert_eq!(notification["notification_type"], "message");
        assert_eq!(notification["title"], "New message from Alice Liddell");
        assert_eq!(notification["related_object_id"], json!(room_id));

        // Persisted before it was acknowledged
        assert!(state.room_service.room_has_unread(2, &room_id).await.expect("query"));
        assert_eq!(state.notification.unread_count(2).await?, 1);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_messages_arrive_in_send_order(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        join(&mut alice, room_id).await;
        join(&mut bob, room_id).await;

        for n in 0..5 {
            send_json(
                &mut alice,
                json!({"type": "send_message", "room_id": room_id, "content": format!("m{}", n)}),
            )
            .await;
        }

        for n in 0..5 {
            let frame = next_event_of(&mut bob, "chat_message").await;
            assert_eq!(frame["message"]["content"], format!("m{}", n));
        }

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_left_room_stops_delivery(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        join(&mut alice, room_id).await;
        join(&mut bob, room_id).await;

        send_json(&mut bob, json!({"type": "leave_room", "room_id": room_id})).await;
        let left = next_event_of(&mut bob, "room_left").await;
        assert_eq!(left["room_id"], json!(room_id));

        send_json(
            &mut alice,
            json!({"type": "send_message", "room_id": room_id, "content": "anyone?"}),
        )
        .await;
        next_event_of(&mut alice, "message_sent").await;

        // Still a member: the per-user group carries the room list update
        let update = next_event_of(&mut bob, "room_list_update").await;
        assert_eq!(update["latest_message"]["content"], "anyone?");
        assert_no_event_of(&mut bob, "chat_message", 300).await;

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_revoked_membership_blocks_sending(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let server = create_test_server(state.clone());

        let room: Value = server
            .post("/rooms")
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .json(&json!({"room_name": "Secret", "is_private": true, "member_ids": [2]}))
            .await
            .json();
        let room_id: Uuid = serde_json::from_value(room["room_id"].clone()).expect("room id");

        let mut bob = connect_active(addr, BOB).await;
        join(&mut bob, room_id).await;

        server
            .delete(&format!("/rooms/{}/members/2", room_id))
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .await
            .assert_status(axum::http::StatusCode::NO_CONTENT);

        let removed = next_event_of(&mut bob, "member_removed").await;
        assert_eq!(removed["user_id"], 2);
        assert_eq!(removed["removed_by_name"], "Alice Liddell");

        send_json(
            &mut bob,
            json!({"type": "send_message", "room_id": room_id, "content": "still here?"}),
        )
        .await;
        assert_eq!(
            next_event_of_error(&mut bob).await,
            "You are not a member of this room"
        );

        // The cached room is gone with the membership
        send_json(
            &mut bob,
            json!({"type": "send_message", "room_id": room_id, "content": "again"}),
        )
        .await;
        assert_eq!(next_event_of_error(&mut bob).await, "You must join the room first");

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_edit_and_delete_are_broadcast(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let server = create_test_server(state.clone());
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        join(&mut alice, room_id).await;
        join(&mut bob, room_id).await;

        send_json(
            &mut alice,
            json!({"type": "send_message", "room_id": room_id, "content": "helo"}),
        )
        .await;
        let ack = next_event_of(&mut alice, "message_sent").await;
        let message_id = ack["message_id"].as_str().expect("id").to_string();

        server
            .patch(&format!("/messages/{}", message_id))
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .json(&json!({"content": "hello"}))
            .await
            .assert_status_ok();

        let edited = next_event_of(&mut bob, "message_edited").await;
        assert_eq!(edited["message_id"], message_id.as_str());
        assert_eq!(edited["new_content"], "hello");
        assert_eq!(edited["sender_full_name"], "Alice Liddell");

        server
            .delete(&format!("/messages/{}", message_id))
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .await
            .assert_status_ok();

        let deleted = next_event_of(&mut bob, "message_deleted").await;
        assert_eq!(deleted["message_id"], message_id.as_str());
        assert_eq!(deleted["room_id"], json!(room_id));

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_typing_is_not_echoed_to_the_typist(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        join(&mut alice, room_id).await;
        join(&mut bob, room_id).await;

        send_json(
            &mut alice,
            json!({"type": "typing", "room_id": room_id, "is_typing": true}),
        )
        .await;

        let typing = next_event_of(&mut bob, "typing_indicator").await;
        assert_eq!(typing["user"], "Alice Liddell");
        assert_eq!(typing["user_id"], 1);
        assert_eq!(typing["is_typing"], true);

        assert_no_event_of(&mut alice, "typing_indicator", 300).await;

        Ok(())
    }

    // ============================================================
    // Membership events and presence
    // ============================================================

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_added_member_is_told_on_their_own_group(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let server = create_test_server(state.clone());

        let room: Value = server
            .post("/rooms")
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .json(&json!({"room_name": "Team"}))
            .await
            .json();
        let room_id: Uuid = serde_json::from_value(room["room_id"].clone()).expect("room id");

        let mut carol = connect_active(addr, CAROL).await;

        server
            .post(&format!("/rooms/{}/members", room_id))
            .add_header(HeaderName::from_static("authorization"), bearer(ALICE))
            .json(&json!({"user_id": 3}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let added = next_event_of(&mut carol, "member_added").await;
        assert_eq!(added["user_id"], 3);
        assert_eq!(added["full_name"], "Carol Danvers");
        assert_eq!(added["added_by"], 1);

        // The new member can join right away
        join(&mut carol, room_id).await;
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_room_viewers_follow_join_and_leave(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let server = create_test_server(state.clone());
        let room_id = dm_room_id(&state).await;
        let path = format!("/rooms/{}/presence", room_id);

        let mut alice = connect_active(addr, ALICE).await;
        join(&mut alice, room_id).await;

        let viewers: Vec<Value> = server
            .get(&path)
            .add_header(HeaderName::from_static("authorization"), bearer(BOB))
            .await
            .json();
        assert_eq!(viewers, vec![json!({"id": 1, "full_name": "Alice Liddell"})]);

        // Non members cannot look
        server
            .get(&path)
            .add_header(HeaderName::from_static("authorization"), bearer(CAROL))
            .await
            .assert_status(axum::http::StatusCode::FORBIDDEN);

        send_json(&mut alice, json!({"type": "leave_room", "room_id": room_id})).await;
        next_event_of(&mut alice, "room_left").await;

        let viewers: Vec<Value> = server
            .get(&path)
            .add_header(HeaderName::from_static("authorization"), bearer(BOB))
            .await
            .json();
        assert!(viewers.is_empty());

        Ok(())
    }

    /// Bob opens two sessions: each one announces him online, only the last close
    /// announces him offline.
    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_offline_only_after_the_last_session(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        let room_id = dm_room_id(&state).await;

        let mut alice = connect_active(addr, ALICE).await;
        join(&mut alice, room_id).await;

        let mut bob_phone = connect_active(addr, BOB).await;
        let status = next_event_of(&mut alice, "user_status_changed").await;
        assert_eq!(status["user_id"], 2);
        assert_eq!(status["status"], "online");

        let mut bob_laptop = connect_active(addr, BOB).await;
        let status = next_event_of(&mut alice, "user_status_changed").await;
        assert_eq!(status["status"], "online");
        assert_eq!(state.sessions.sessions_of(2), 2);

        bob_phone.close(None).await.expect("closed");
        {
            let state = state.clone();
            eventually(move || {
                let state = state.clone();
                async move { state.sessions.sessions_of(2) == 1 }
            })
            .await;
        }
        assert_no_event_of(&mut alice, "user_status_changed", 300).await;
        assert_eq!(
            state.presence_service.status(2).await.expect("status"),
            PresenceStatus::Online
        );

        bob_laptop.close(None).await.expect("closed");
        let status = next_event_of(&mut alice, "user_status_changed").await;
        assert_eq!(status["user_id"], 2);
        assert_eq!(status["status"], "offline");

        {
            let state = state.clone();
            eventually(move || {
                let state = state.clone();
                async move {
                    matches!(
                        state.presence_service.status(2).await,
                        Ok(PresenceStatus::Offline)
                    )
                }
            })
            .await;
        }
        assert_eq!(state.sessions.sessions_of(2), 0);

        Ok(())
    }

    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_shutdown_closes_every_session(pool: SqlitePool) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;

        let mut alice = connect_active(addr, ALICE).await;
        let mut bob = connect_active(addr, BOB).await;
        assert_eq!(state.sessions.online_count(), 2);

        state.sessions.shutdown_all();

        assert_eq!(next_close_code(&mut alice).await, 1001);
        assert_eq!(next_close_code(&mut bob).await, 1001);

        {
            let state = state.clone();
            eventually(move || {
                let state = state.clone();
                async move { state.sessions.online_count() == 0 }
            })
            .await;
        }
        assert_eq!(
            state.presence_service.status(1).await.expect("status"),
            PresenceStatus::Offline
        );

        Ok(())
    }

    /// The rooms of the user are unreadable while connecting: the online announcement is
    /// skipped, but the session is still counted and released.
    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_presence_is_released_when_the_announcement_fails(
        pool: SqlitePool,
    ) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let addr = spawn_test_app(state.clone()).await;
        sqlx::query("DROP TABLE room_members").execute(&pool).await?;

        let mut bob = connect_active(addr, BOB).await;
        assert_eq!(
            state.presence_service.status(2).await.expect("status"),
            PresenceStatus::Online
        );

        bob.close(None).await.expect("closed");
        {
            let state = state.clone();
            eventually(move || {
                let state = state.clone();
                async move {
                    matches!(
                        state.presence_service.status(2).await,
                        Ok(PresenceStatus::Offline)
                    )
                }
            })
            .await;
        }
        assert_eq!(state.sessions.sessions_of(2), 0);

        Ok(())
    }

    /// A client that only listens keeps its connection past the idle window by answering
    /// the server's pings.
    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_passive_client_outlives_the_idle_window(pool: SqlitePool) -> sqlx::Result<()> {
        let state = Arc::new(
            AppState::in_process(pool.clone(), TEST_JWT_SECRET.to_string(), 64)
                .with_idle_timeout(Duration::from_secs(1)),
        );
        let addr = spawn_test_app(state.clone()).await;
        let mut alice = connect_active(addr, ALICE).await;

        // Keep reading so the client answers pings, without sending anything
        let deadline = tokio::time::Instant::now() + Duration::from_millis(2500);
        let mut pings = 0;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, alice.next()).await {
                Err(_) => break,
                Ok(Some(Ok(Message::Ping(_)))) => pings += 1,
                Ok(Some(Ok(Message::Close(frame)))) => panic!("Closed while idle: {:?}", frame),
                Ok(Some(Ok(_))) => {}
                Ok(other) => panic!("Connection lost while idle: {:?}", other),
            }
        }
        assert!(pings >= 2, "only {} pings received", pings);

        send_json(&mut alice, json!({"type": "join_room"})).await;
        assert_eq!(next_event_of_error(&mut alice).await, "room_id is required");
        assert_eq!(state.sessions.sessions_of(1), 1);

        Ok(())
    }

    /// Leaving a room after the writer stopped still drops the room channel.
    #[sqlx::test(fixtures(path = "../fixtures", scripts("users")))]
    async fn test_leave_after_writer_stopped_releases_the_room_group(
        pool: SqlitePool,
    ) -> sqlx::Result<()> {
        let state = create_test_state(&pool);
        let room_id = dm_room_id(&state).await;
        let group = GroupName::room(&room_id);

        let (internal_tx, internal_rx) = unbounded_channel();
        drop(internal_rx);
        let mut session = Session::new(state.clone(), alice(), internal_tx);

        session
            .handle_text(&json!({"type": "join_room", "room_id": room_id}).to_string())
            .await;
        assert!(state.bus.holds_group(&group));

        session
            .handle_text(&json!({"type": "leave_room", "room_id": room_id}).to_string())
            .await;
        assert!(!state.bus.holds_group(&group));

        session.close().await;
        Ok(())
    }

    /// Next error frame, skipping events that are not errors
    async fn next_event_of_error(socket: &mut TestSocket) -> String {
        for _ in 0..16 {
            let frame = next_json(socket).await;
            if let Some(error) = frame["error"].as_str() {
                return error.to_string();
            }
        }
        panic!("No error frame received");
    }
}
