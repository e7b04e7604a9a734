//! Redis presence store, shared by every server process
//!
//! Keys (all under the configured prefix):
//! - `<prefix>:presence:sessions` hash user id -> live session count
//! - `<prefix>:global_user_status` hash user id -> "online" | "offline"
//! - `<prefix>:room:<room_id>:presence` hash viewing user id -> sessions viewing the room

use crate::entities::PresenceStatus;
use crate::presence::{PresenceError, PresenceStore};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Count a session and flag the user online in one step
const CONNECT_SCRIPT: &str = r#"
    local count = redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
    redis.call('HSET', KEYS[2], ARGV[1], 'online')
    return count
"#;

/// Release a session; the last one flags the user offline. Never goes below zero.
const DISCONNECT_SCRIPT: &str = r#"
    local count = redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
    if count <= 0 then
        redis.call('HDEL', KEYS[1], ARGV[1])
        redis.call('HSET', KEYS[2], ARGV[1], 'offline')
        return 0
    end
    return count
"#;

/// Release one viewing session of the room, dropping the viewer at zero
const LEAVE_ROOM_SCRIPT: &str = r#"
    if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
        return 0
    end
    local count = redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
    if count <= 0 then
        redis.call('HDEL', KEYS[1], ARGV[1])
        return 0
    end
    return count
"#;

#[derive(Clone)]
pub struct RedisPresenceStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisPresenceStore {
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, PresenceError> {
        let pool = PoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        info!("Redis presence store ready");
        Ok(Self {
            pool,
            key_prefix: key_prefix.into(),
        })
    }

    fn sessions_key(&self) -> String {
        format!("{}:presence:sessions", self.key_prefix)
    }

    fn status_key(&self) -> String {
        format!("{}:global_user_status", self.key_prefix)
    }

    fn room_key(&self, room_id: &Uuid) -> String {
        format!("{}:room:{}:presence", self.key_prefix, room_id)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    #[instrument(skip(self))]
    async fn connect_user(&self, user_id: i32) -> Result<u64, PresenceError> {
        let mut conn = self.pool.get().await?;
        let count: u64 = Script::new(CONNECT_SCRIPT)
            .key(self.sessions_key())
            .key(self.status_key())
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        debug!(sessions = count, "Session counted");
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn disconnect_user(&self, user_id: i32) -> Result<u64, PresenceError> {
        let mut conn = self.pool.get().await?;
        let remaining: u64 = Script::new(DISCONNECT_SCRIPT)
            .key(self.sessions_key())
            .key(self.status_key())
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        debug!(sessions = remaining, "Session released");
        Ok(remaining)
    }

    async fn status(&self, user_id: i32) -> Result<PresenceStatus, PresenceError> {
        let mut conn = self.pool.get().await?;
        let status: Option<String> = conn.hget(self.status_key(), user_id).await?;
        Ok(match status.as_deref() {
            Some("online") => PresenceStatus::Online,
            _ => PresenceStatus::Offline,
        })
    }

    async fn enter_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.hincr(self.room_key(room_id), user_id, 1).await?;
        Ok(())
    }

    async fn leave_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError> {
        let mut conn = self.pool.get().await?;
        let remaining: u64 = Script::new(LEAVE_ROOM_SCRIPT)
            .key(self.room_key(room_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        debug!(room_id = %room_id, remaining, "Room viewing session released");
        Ok(())
    }

    async fn room_viewers(&self, room_id: &Uuid) -> Result<Vec<i32>, PresenceError> {
        let mut conn = self.pool.get().await?;
        let mut viewers: Vec<i32> = conn.hkeys(self.room_key(room_id)).await?;
        viewers.sort_unstable();
        Ok(viewers)
    }
}
