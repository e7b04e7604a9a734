//! RoomService - Rooms, DMs, membership changes and unread state

use crate::core::AppError;
use crate::core::auth::Identity;
use crate::dtos::{CreateMembershipDTO, CreateRoomDTO, RoomDTO, RoomSeenDTO, ServerEvent};
use crate::entities::Room;
use crate::fanout::{FanoutBus, GroupName};
use crate::repositories::{
    Create, Delete, LastSeenRepository, MembershipRepository, Read, ReadMany, RoomRepository,
    UserRepository,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct RoomService {
    room: RoomRepository,
    membership: MembershipRepository,
    user: UserRepository,
    last_seen: LastSeenRepository,
    bus: Arc<dyn FanoutBus>,
}

impl RoomService {
    pub fn new(
        room: RoomRepository,
        membership: MembershipRepository,
        user: UserRepository,
        last_seen: LastSeenRepository,
        bus: Arc<dyn FanoutBus>,
    ) -> Self {
        Self {
            room,
            membership,
            user,
            last_seen,
            bus,
        }
    }

    pub async fn find_room(&self, room_id: &Uuid) -> Result<Room, AppError> {
        self.room
            .read(room_id)
            .await?
            .ok_or_else(|| AppError::not_found("Room not found"))
    }

    /// The room, provided `user_id` currently belongs to it
    #[instrument(skip(self))]
    pub async fn require_member(&self, room_id: &Uuid, user_id: i32) -> Result<Room, AppError> {
        let room = self.find_room(room_id).await?;
        if !self.membership.is_member(room_id, user_id).await? {
            warn!("User is not a member of the room");
            return Err(AppError::forbidden("You are not a member of this room"));
        }
        Ok(room)
    }

    #[instrument(skip(self, creator, data), fields(user_id = creator.user_id))]
    pub async fn create_room(
        &self,
        creator: &Identity,
        data: &CreateRoomDTO,
    ) -> Result<RoomDTO, AppError> {
        data.validate()?;

        let mut requested: Vec<i32> = data
            .member_ids
            .iter()
            .copied()
            .filter(|id| *id != creator.user_id)
            .collect();
        requested.sort_unstable();
        requested.dedup();

        if self.user.read_many(&requested).await?.len() != requested.len() {
            return Err(AppError::bad_request("Some of the requested members do not exist"));
        }

        let room = self.room.create_with_members(creator.user_id, data).await?;
        let members = self.membership.members_of_room(&room.room_id).await?;

        let mut dto = RoomDTO::from(room);
        dto.members = Some(members);
        Ok(dto)
    }

    /// Idempotent: the same room comes back for the pair in either order
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn create_or_get_dm_room(
        &self,
        requester: &Identity,
        target_user_id: i32,
    ) -> Result<RoomDTO, AppError> {
        if requester.user_id == target_user_id {
            return Err(AppError::bad_request(
                "Cannot create a direct message room with yourself",
            ));
        }

        let target = self
            .user
            .find_by_id(target_user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let room_name = format!("DM: {} & {}", requester.full_name, target.full_name);
        let description = format!(
            "Direct message between {} and {}",
            requester.full_name, target.full_name
        );

        let (room, created) = self
            .room
            .create_or_get_dm(requester.user_id, target.user_id, &room_name, &description)
            .await?;
        debug!(room_id = %room.room_id, created, "DM room resolved");

        let members = self.membership.members_of_room(&room.room_id).await?;
        let mut dto = RoomDTO::from(room);
        dto.members = Some(members);
        Ok(dto)
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn add_member(
        &self,
        actor: &Identity,
        room_id: Uuid,
        user_id: i32,
    ) -> Result<(), AppError> {
        let room = self.find_room(&room_id).await?;
        if room.is_dm {
            return Err(AppError::bad_request(
                "Cannot add members to a direct message room",
            ));
        }
        if room.creator_id != Some(actor.user_id) {
            warn!("Only the creator may add members");
            return Err(AppError::forbidden("Only the room creator can add members"));
        }

        let target = self
            .user
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if self.membership.is_member(&room_id, user_id).await? {
            return Err(AppError::conflict("User is already a member of this room"));
        }

        self.membership
            .create(&CreateMembershipDTO {
                room_id,
                user_id,
                joined_at: Utc::now(),
            })
            .await?;
        info!(user_id, "Member added");

        let event = ServerEvent::MemberAdded {
            user_id,
            full_name: target.full_name,
            room_id,
            added_by: actor.user_id,
            added_by_name: actor.full_name.clone(),
        };
        self.publish_to_room_and_user(&room_id, user_id, &event).await;
        Ok(())
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn remove_member(
        &self,
        actor: &Identity,
        room_id: Uuid,
        user_id: i32,
    ) -> Result<(), AppError> {
        let room = self.find_room(&room_id).await?;
        if room.is_dm {
            return Err(AppError::bad_request(
                "Cannot remove members from a direct message room",
            ));
        }
        if room.creator_id != Some(actor.user_id) {
            warn!("Only the creator may remove members");
            return Err(AppError::forbidden("Only the room creator can remove members"));
        }
        if !room.is_private {
            return Err(AppError::bad_request(
                "Members can only be removed from private rooms",
            ));
        }
        if user_id == actor.user_id {
            return Err(AppError::bad_request(
                "The room creator cannot remove themself",
            ));
        }

        let target = self
            .user
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !self.membership.delete(&(room_id, user_id)).await? {
            return Err(AppError::not_found("User is not a member of this room"));
        }
        info!(user_id, "Member removed");

        let event = ServerEvent::MemberRemoved {
            user_id,
            full_name: target.full_name,
            room_id,
            removed_by: actor.user_id,
            removed_by_name: actor.full_name.clone(),
        };
        self.publish_to_room_and_user(&room_id, user_id, &event).await;
        Ok(())
    }

    /// Move the caller's LastSeen watermark of the room to now
    #[instrument(skip(self))]
    pub async fn mark_seen(&self, user_id: i32, room_id: Uuid) -> Result<RoomSeenDTO, AppError> {
        self.require_member(&room_id, user_id).await?;
        let seen = self.last_seen.touch(user_id, &room_id, Utc::now()).await?;
        Ok(RoomSeenDTO {
            room_id,
            last_seen_at: seen.last_seen_at,
        })
    }

    /// Whether a member has messages from others past their watermark of the room
    pub async fn room_has_unread(&self, user_id: i32, room_id: &Uuid) -> Result<bool, AppError> {
        self.require_member(room_id, user_id).await?;
        Ok(self.last_seen.room_has_unread(user_id, room_id).await?)
    }

    pub async fn unread_count(&self, user_id: i32) -> Result<i64, AppError> {
        Ok(self.last_seen.unread_count(user_id).await?)
    }

    async fn publish_to_room_and_user(&self, room_id: &Uuid, user_id: i32, event: &ServerEvent) {
        for group in [GroupName::room(room_id), GroupName::user(user_id)] {
            if let Err(e) = self.bus.publish(&group, event).await {
                warn!(group = %group, kind = event.kind(), "Publish failed: {}", e);
            }
        }
    }
}
