//! Fanout Bus - Group addressed broadcast of server events
//!
//! A group is one room (`chat_<room_id>`) or one user (`user_<user_id>`). Publishing an
//! event delivers it to every session subscribed to the group, in publish order per group.
//!
//! Two implementations:
//! - [`LocalFanoutBus`]: in-process only, for a single server process and for tests
//! - [`RedisFanoutBus`]: Redis pub/sub, shared by every server process

pub mod groups;
pub mod local;
pub mod redis_backend;

pub use groups::GroupMap;
pub use local::LocalFanoutBus;
pub use redis_backend::RedisFanoutBus;

use crate::dtos::ServerEvent;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

/// Name of a broadcast group, derived deterministically from a room or a user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    pub fn room(room_id: &Uuid) -> Self {
        Self(format!("chat_{room_id}"))
    }

    pub fn user(user_id: i32) -> Self {
        Self(format!("user_{user_id}"))
    }

    /// Rebuild a group name received from the shared bus
    pub fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("redis pool setup failed: {0}")]
    PoolSetup(#[from] deadpool_redis::CreatePoolError),
    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publish/subscribe by group name.
///
/// `subscribe` hands out a broadcast receiver; once the receiver is dropped the caller
/// must `release` the group so idle groups do not accumulate.
#[async_trait]
pub trait FanoutBus: Send + Sync {
    async fn publish(&self, group: &GroupName, event: &ServerEvent) -> Result<(), FanoutError>;

    /// Returns once events published to `group` from now on are guaranteed to reach the receiver
    async fn subscribe(
        &self,
        group: &GroupName,
    ) -> Result<Receiver<Arc<ServerEvent>>, FanoutError>;

    async fn release(&self, group: &GroupName) -> Result<(), FanoutError>;

    /// Whether this process still keeps a local channel for the group
    fn holds_group(&self, group: &GroupName) -> bool;
}
