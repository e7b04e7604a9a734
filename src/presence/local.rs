//! In-process presence store, valid only while every session lives in one process

use crate::entities::PresenceStatus;
use crate::presence::{PresenceError, PresenceStore};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Default)]
pub struct LocalPresenceStore {
    sessions: DashMap<i32, u64>,
    /// room -> viewing user -> sessions of that user viewing it
    rooms: DashMap<Uuid, HashMap<i32, u64>>,
}

impl LocalPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for LocalPresenceStore {
    #[instrument(skip(self))]
    async fn connect_user(&self, user_id: i32) -> Result<u64, PresenceError> {
        let mut count = self.sessions.entry(user_id).or_insert(0);
        *count += 1;
        debug!(sessions = *count, "Session counted");
        Ok(*count)
    }

    #[instrument(skip(self))]
    async fn disconnect_user(&self, user_id: i32) -> Result<u64, PresenceError> {
        let remaining = match self.sessions.entry(user_id) {
            Entry::Occupied(mut entry) if *entry.get() > 1 => {
                *entry.get_mut() -= 1;
                *entry.get()
            }
            Entry::Occupied(entry) => {
                entry.remove();
                0
            }
            Entry::Vacant(_) => 0,
        };
        debug!(sessions = remaining, "Session released");
        Ok(remaining)
    }

    async fn status(&self, user_id: i32) -> Result<PresenceStatus, PresenceError> {
        Ok(if self.sessions.contains_key(&user_id) {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        })
    }

    async fn enter_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError> {
        *self
            .rooms
            .entry(*room_id)
            .or_default()
            .entry(user_id)
            .or_insert(0) += 1;
        Ok(())
    }

    async fn leave_room(&self, room_id: &Uuid, user_id: i32) -> Result<(), PresenceError> {
        if let Some(mut viewers) = self.rooms.get_mut(room_id) {
            if let Some(count) = viewers.get_mut(&user_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    viewers.remove(&user_id);
                }
            }
        }
        self.rooms.remove_if(room_id, |_, viewers| viewers.is_empty());
        Ok(())
    }

    async fn room_viewers(&self, room_id: &Uuid) -> Result<Vec<i32>, PresenceError> {
        let mut viewers: Vec<i32> = self
            .rooms
            .get(room_id)
            .map(|viewers| viewers.keys().copied().collect())
            .unwrap_or_default();
        viewers.sort_unstable();
        Ok(viewers)
    }
}
