//! WebSocket Event Handlers - Connection Session state and inbound frame handling
//!
//! The session owns what this connection joined. `active_rooms` is only a cache of the
//! subscribed room groups: every join and every send is checked against the membership
//! table first.

use crate::core::auth::Identity;
use crate::core::{AppError, AppState};
use crate::dtos::{ClientFrame, ServerEvent};
use crate::entities::{DeliveryStatus, Room};
use crate::fanout::GroupName;
use crate::ws::close_codes;
use crate::ws::registry::InternalSignal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

pub struct Session {
    app: Arc<AppState>,
    identity: Identity,
    status: SessionState,
    internal_tx: UnboundedSender<InternalSignal>,
    active_rooms: HashMap<Uuid, Room>,
    /// Every group this session holds a receiver for
    groups: HashSet<GroupName>,
    /// Set once the presence store counted this session
    counted_online: bool,
}

impl Session {
    pub fn new(
        app: Arc<AppState>,
        identity: Identity,
        internal_tx: UnboundedSender<InternalSignal>,
    ) -> Self {
        Self {
            app,
            identity,
            status: SessionState::Connecting,
            internal_tx,
            active_rooms: HashMap::new(),
            groups: HashSet::new(),
            counted_online: false,
        }
    }

    pub fn status(&self) -> SessionState {
        self.status
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Connecting -> Active: subscribe the per-user group, then go online
    #[instrument(skip(self), fields(user_id = self.identity.user_id))]
    pub async fn activate(&mut self) -> Result<(), AppError> {
        self.subscribe(GroupName::user(self.identity.user_id))
            .await?;
        self.app.presence_service.on_connect(&self.identity).await?;
        self.counted_online = true;
        self.status = SessionState::Active;
        info!("Session active");
        Ok(())
    }

    /// Join the room of a room-scoped connection, returning the close code on refusal
    #[instrument(skip(self), fields(user_id = self.identity.user_id))]
    pub async fn auto_join(&mut self, raw_room_id: &str) -> Result<(), u16> {
        let Ok(room_id) = Uuid::parse_str(raw_room_id) else {
            warn!("Room id is not a valid identifier");
            return Err(close_codes::NOT_FOUND);
        };

        self.join_room(Some(room_id)).await.map_err(|e| {
            if e.status().is_server_error() {
                error!("Auto-join failed: {}", e);
            } else {
                warn!("Auto-join refused: {}", e);
            }
            e.close_code()
        })
    }

    /// Handle one inbound text frame. Failures become an error frame, never a close.
    pub async fn handle_text(&mut self, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Rejected inbound frame: {}", e);
                self.reply_error(e.to_string());
                return;
            }
        };

        if let Err(e) = self.dispatch(frame).await {
            self.reply_error(e.message());
        }
    }

    async fn dispatch(&mut self, frame: ClientFrame) -> Result<(), AppError> {
        match frame {
            ClientFrame::JoinRoom { room_id } => self.join_room(room_id).await,
            ClientFrame::LeaveRoom { room_id } => self.leave_room(room_id).await,
            ClientFrame::SendMessage { room_id, content } => {
                self.send_message(room_id, content).await
            }
            ClientFrame::Typing { room_id, is_typing } => self.typing(room_id, is_typing).await,
        }
    }

    #[instrument(skip(self), fields(user_id = self.identity.user_id))]
    async fn join_room(&mut self, room_id: Option<Uuid>) -> Result<(), AppError> {
        let room_id = room_id.ok_or_else(|| AppError::bad_request("room_id is required"))?;
        let room = self.app.room_service.find_room(&room_id).await?;

        if !self
            .app
            .membership
            .is_member(&room_id, self.identity.user_id)
            .await?
        {
            warn!(room_id = %room_id, "Join refused, not a member");
            return Err(AppError::forbidden("Not authorized to join this room"));
        }

        if !self.active_rooms.contains_key(&room_id) {
            // subscribed before confirming, so nothing published after room_joined is missed
            self.subscribe(GroupName::room(&room_id)).await?;
            if let Err(e) = self
                .app
                .presence_service
                .enter_room(&room_id, self.identity.user_id)
                .await
            {
                warn!(room_id = %room_id, "Room presence not recorded: {}", e);
            }
            self.active_rooms.insert(room_id, room.clone());
            info!(room_id = %room_id, "Room joined");
        }

        self.reply(ServerEvent::RoomJoined {
            room_id,
            room_name: room.room_name,
        });
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = self.identity.user_id))]
    async fn leave_room(&mut self, room_id: Option<Uuid>) -> Result<(), AppError> {
        let room_id = room_id.ok_or_else(|| AppError::bad_request("room_id is required"))?;
        if self.active_rooms.remove(&room_id).is_none() {
            return Err(AppError::bad_request("You are not in this room"));
        }

        self.forget_room(&room_id).await;
        self.reply(ServerEvent::RoomLeft { room_id });
        info!(room_id = %room_id, "Room left");
        Ok(())
    }

    #[instrument(skip(self, content), fields(user_id = self.identity.user_id))]
    async fn send_message(
        &mut self,
        room_id: Option<Uuid>,
        content: Option<String>,
    ) -> Result<(), AppError> {
        let (Some(room_id), Some(content)) = (room_id, content.filter(|c| !c.is_empty())) else {
            return Err(AppError::bad_request("room_id and content are required"));
        };
        let room = self
            .active_rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| AppError::bad_request("You must join the room first"))?;

        if !self
            .app
            .membership
            .is_member(&room_id, self.identity.user_id)
            .await?
        {
            warn!(room_id = %room_id, "Membership revoked, dropping cached room");
            self.active_rooms.remove(&room_id);
            self.forget_room(&room_id).await;
            return Err(AppError::forbidden("You are not a member of this room"));
        }

        let message = self
            .app
            .message_service
            .send(&self.identity, &room, &content)
            .await
            .map_err(|e| {
                if e.status().is_server_error() {
                    error!("Failed to save message: {}", e);
                    AppError::internal_server_error("Failed to save message")
                } else {
                    e
                }
            })?;

        self.reply(ServerEvent::MessageSent {
            message_id: message.message_id,
            room_id,
            status: DeliveryStatus::Delivered,
        });

        // the message is stored and acknowledged; fanout failures stay on this side
        if let Err(e) = self.app.message_service.fan_out(&room, &message).await {
            error!(message_id = %message.message_id, "Fanout to members failed: {}", e);
        }
        Ok(())
    }

    async fn typing(&mut self, room_id: Option<Uuid>, is_typing: bool) -> Result<(), AppError> {
        let room_id = room_id.ok_or_else(|| AppError::bad_request("room_id is required"))?;
        let room = self
            .active_rooms
            .get(&room_id)
            .ok_or_else(|| AppError::bad_request("You must join the room first"))?;

        let event = ServerEvent::TypingIndicator {
            user: self.identity.full_name.clone(),
            user_id: self.identity.user_id,
            room: room.room_name.clone(),
            room_id,
            is_typing,
        };
        self.app
            .bus
            .publish(&GroupName::room(&room_id), &event)
            .await?;
        debug!(room_id = %room_id, is_typing, "Typing published");
        Ok(())
    }

    async fn subscribe(&mut self, group: GroupName) -> Result<(), AppError> {
        let rx = self.app.bus.subscribe(&group).await?;
        self.groups.insert(group.clone());
        self.signal(InternalSignal::Subscribe(group, rx));
        Ok(())
    }

    /// Unsubscribe a room group and drop the user from the room's viewers
    async fn forget_room(&mut self, room_id: &Uuid) {
        let group = GroupName::room(room_id);
        self.groups.remove(&group);
        if self
            .internal_tx
            .send(InternalSignal::Unsubscribe(group.clone()))
            .is_err()
        {
            // the writer is gone and its receivers with it
            if let Err(e) = self.app.bus.release(&group).await {
                warn!(group = %group, "Group release failed: {}", e);
            }
        }

        if let Err(e) = self
            .app
            .presence_service
            .leave_room(room_id, self.identity.user_id)
            .await
        {
            warn!(room_id = %room_id, "Room presence not cleared: {}", e);
        }
    }

    /// Active -> Closed. Runs after the writer task has stopped, whatever ended the session.
    #[instrument(skip(self), fields(user_id = self.identity.user_id))]
    pub async fn close(&mut self) {
        self.status = SessionState::Closed;

        for group in self.groups.drain() {
            if let Err(e) = self.app.bus.release(&group).await {
                warn!(group = %group, "Group release failed: {}", e);
            }
        }

        for room_id in std::mem::take(&mut self.active_rooms).into_keys() {
            if let Err(e) = self
                .app
                .presence_service
                .leave_room(&room_id, self.identity.user_id)
                .await
            {
                warn!(room_id = %room_id, "Room presence not cleared: {}", e);
            }
        }

        if std::mem::take(&mut self.counted_online) {
            if let Err(e) = self.app.presence_service.on_disconnect(&self.identity).await {
                error!("Presence not released: {}", e);
            }
        }
        info!("Session closed");
    }

    pub fn signal(&self, signal: InternalSignal) {
        if self.internal_tx.send(signal).is_err() {
            debug!("Writer task gone, signal dropped");
        }
    }

    fn reply(&self, event: ServerEvent) {
        self.signal(InternalSignal::Frame(event));
    }

    fn reply_error(&self, message: impl Into<String>) {
        self.signal(InternalSignal::Error(message.into()));
    }
}
