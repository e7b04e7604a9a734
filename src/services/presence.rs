//! PresenceService - Global online state and per-room viewers

use crate::core::AppError;
use crate::core::auth::Identity;
use crate::dtos::{ServerEvent, UserSummaryDTO};
use crate::entities::PresenceStatus;
use crate::fanout::{FanoutBus, GroupName};
use crate::presence::PresenceStore;
use crate::repositories::{MembershipRepository, ReadMany, UserRepository};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn PresenceStore>,
    membership: MembershipRepository,
    user: UserRepository,
    bus: Arc<dyn FanoutBus>,
}

impl PresenceService {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        membership: MembershipRepository,
        user: UserRepository,
        bus: Arc<dyn FanoutBus>,
    ) -> Self {
        Self {
            store,
            membership,
            user,
            bus,
        }
    }

    /// Count the new session and announce the user online in every room they belong to.
    ///
    /// Only a failure to count the session is returned: once counted, the session must be
    /// released by [`on_disconnect`](Self::on_disconnect), so the announcement is best-effort.
    #[instrument(skip(self, identity), fields(user_id = identity.user_id))]
    pub async fn on_connect(&self, identity: &Identity) -> Result<(), AppError> {
        let sessions = self.store.connect_user(identity.user_id).await?;
        info!(sessions, "User online");
        self.announce(identity, PresenceStatus::Online).await;
        Ok(())
    }

    /// Release the session; only the last one announces the user offline
    #[instrument(skip(self, identity), fields(user_id = identity.user_id))]
    pub async fn on_disconnect(&self, identity: &Identity) -> Result<(), AppError> {
        let remaining = self.store.disconnect_user(identity.user_id).await?;
        if remaining > 0 {
            debug!(remaining, "Other sessions still open, user stays online");
            return Ok(());
        }
        info!("User offline");
        self.announce(identity, PresenceStatus::Offline).await;
        Ok(())
    }

    async fn announce(&self, identity: &Identity, status: PresenceStatus) {
        let rooms = match self.membership.rooms_of_user(identity.user_id).await {
            Ok(rooms) => rooms,
            Err(e) => {
                error!(status = status.as_str(), "Rooms unavailable, status not announced: {}", e);
                return;
            }
        };
        let event = ServerEvent::UserStatusChanged {
            user_id: identity.user_id,
            full_name: identity.full_name.clone(),
            status,
        };

        for room_id in &rooms {
            if let Err(e) = self.bus.publish(&GroupName::room(room_id), &event).await {
                warn!(room_id = %room_id, "Status publish failed: {}", e);
            }
        }
        debug!(rooms = rooms.len(), status = status.as_str(), "Status announced");
    }

    pub async fn status(&self, user_id: i32) -> Result<PresenceStatus, AppError> {
        Ok(self.store.status(user_id).await?)
    }

    pub async fn enter_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), AppError> {
        Ok(self.store.enter_room(room_id, user_id).await?)
    }

    pub async fn leave_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), AppError> {
        Ok(self.store.leave_room(room_id, user_id).await?)
    }

    /// Who is currently viewing the room
    #[instrument(skip(self))]
    pub async fn viewers(&self, room_id: &Uuid) -> Result<Vec<UserSummaryDTO>, AppError> {
        let ids = self.store.room_viewers(room_id).await?;
        let mut viewers: Vec<UserSummaryDTO> = self
            .user
            .read_many(&ids)
            .await?
            .iter()
            .map(UserSummaryDTO::from)
            .collect();
        viewers.sort_by_key(|v| v.id);
        Ok(viewers)
    }
}
