//! Application State - Global state shared by routes, middleware and sessions

use crate::fanout::{FanoutBus, LocalFanoutBus};
use crate::presence::{LocalPresenceStore, PresenceStore};
use crate::repositories::{
    LastSeenRepository, MembershipRepository, MessageRepository, NotificationRepository,
    RoomRepository, UserRepository,
};
use crate::services::{MessageService, NotificationService, PresenceService, RoomService};
use crate::ws::SessionRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AppState {
    /// Repository for the users mirrored from the account service
    pub user: UserRepository,

    pub room: RoomRepository,

    pub membership: MembershipRepository,

    pub msg: MessageRepository,

    pub last_seen: LastSeenRepository,

    pub notification: NotificationRepository,

    /// Secret key for JWT tokens
    pub jwt_secret: String,

    pub bus: Arc<dyn FanoutBus>,

    pub message_service: MessageService,

    pub notification_service: NotificationService,

    pub presence_service: PresenceService,

    pub room_service: RoomService,

    /// Live sessions of this process
    pub sessions: SessionRegistry,

    /// A session without inbound frames for this long is closed
    pub ws_idle_timeout: Duration,
}

impl AppState {
    /// Build the state over a connection pool and the shared bus/presence backends
    ///
    /// # Arguments
    /// * `pool` - Shared SQLite connection pool
    /// * `jwt_secret` - Secret used to verify identity tokens
    /// * `bus` - Fanout bus, in-process or Redis
    /// * `presence` - Presence store, in-process or Redis
    pub fn new(
        pool: SqlitePool,
        jwt_secret: String,
        bus: Arc<dyn FanoutBus>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        let user = UserRepository::new(pool.clone());
        let room = RoomRepository::new(pool.clone());
        let membership = MembershipRepository::new(pool.clone());
        let msg = MessageRepository::new(pool.clone());
        let last_seen = LastSeenRepository::new(pool.clone());
        let notification = NotificationRepository::new(pool);

        let notification_service = NotificationService::new(notification.clone(), bus.clone());
        let message_service = MessageService::new(
            msg.clone(),
            user.clone(),
            membership.clone(),
            notification_service.clone(),
            bus.clone(),
        );
        let presence_service =
            PresenceService::new(presence, membership.clone(), user.clone(), bus.clone());
        let room_service = RoomService::new(
            room.clone(),
            membership.clone(),
            user.clone(),
            last_seen.clone(),
            bus.clone(),
        );

        Self {
            user,
            room,
            membership,
            msg,
            last_seen,
            notification,
            jwt_secret,
            bus,
            message_service,
            notification_service,
            presence_service,
            room_service,
            sessions: SessionRegistry::new(),
            ws_idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Single-process state with the in-memory bus and presence store
    pub fn in_process(pool: SqlitePool, jwt_secret: String, broadcast_capacity: usize) -> Self {
        Self::new(
            pool,
            jwt_secret,
            Arc::new(LocalFanoutBus::new(broadcast_capacity)),
            Arc::new(LocalPresenceStore::new()),
        )
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.ws_idle_timeout = timeout;
        self
    }
}
