//! Presence Store - Ephemeral online state
//!
//! Two independent views:
//! - global: a per-user counter of live sessions; the user is online iff it is above zero
//! - per room: the users currently viewing a room, unrelated to membership; like the
//!   global view it counts sessions, so a user viewing from two tabs stays until both leave
//!
//! Counter updates are atomic at the store level so sessions of the same user may live on
//! different processes.

pub mod local;
pub mod redis_backend;

pub use local::LocalPresenceStore;
pub use redis_backend::RedisPresenceStore;

use crate::entities::PresenceStatus;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("redis pool setup failed: {0}")]
    PoolSetup(#[from] deadpool_redis::CreatePoolError),
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Register one more live session, returning the user's live session count
    async fn connect_user(&self, user_id: i32) -> Result<u64, PresenceError>;

    /// Unregister a live session, returning how many remain (0 means offline)
    async fn disconnect_user(&self, user_id: i32) -> Result<u64, PresenceError>;

    async fn status(&self, user_id: i32) -> Result<PresenceStatus, PresenceError>;

    async fn enter_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError>;

    async fn leave_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError>;

    /// Users currently viewing the room, in ascending id order
    async fn room_viewers(&self, room_id: &Uuid) -> Result<Vec<i32>, PresenceError>;
}
