use crate::dtos::ServerEvent;
use crate::fanout::GroupName;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, instrument};

/// Local broadcast channel of every group with at least one subscriber in this process
pub struct GroupMap {
    /// Attribute to retrieve the tx head of a broadcast channel by group name
    channels: DashMap<GroupName, Sender<Arc<ServerEvent>>>,
    capacity: usize,
}

impl GroupMap {
    pub fn new(capacity: usize) -> Self {
        GroupMap {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get a rx head for the group, creating its channel if needed.
    /// The flag is true when the channel was just created.
    #[instrument(skip(self), fields(group = %group))]
    pub fn subscribe(&self, group: &GroupName) -> (Receiver<Arc<ServerEvent>>, bool) {
        match self.channels.entry(group.clone()) {
            Entry::Occupied(entry) => {
                debug!("Subscribing to existing broadcast channel");
                (entry.get().subscribe(), false)
            }
            Entry::Vacant(entry) => {
                debug!("Creating new broadcast channel for group");
                // Arc to share the event, not copy it on each rx
                let (tx, rx) = broadcast::channel::<Arc<ServerEvent>>(self.capacity);
                entry.insert(tx);
                (rx, true)
            }
        }
    }

    /// Hand the event to every local receiver of the group, returning how many got it
    pub fn deliver(&self, group: &GroupName, event: Arc<ServerEvent>) -> usize {
        match self.channels.get(group) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the group's channel if nobody listens anymore. True when it was dropped.
    #[instrument(skip(self), fields(group = %group))]
    pub fn release(&self, group: &GroupName) -> bool {
        let removed = self
            .channels
            .remove_if(group, |_, tx| tx.receiver_count() == 0)
            .is_some();
        if removed {
            debug!("Broadcast channel dropped");
        }
        removed
    }

    /// Every group with a local channel, for replaying subscriptions
    pub fn names(&self) -> Vec<GroupName> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn contains(&self, group: &GroupName) -> bool {
        self.channels.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn left(room_id: Uuid) -> Arc<ServerEvent> {
        Arc::new(ServerEvent::RoomLeft { room_id })
    }

    #[tokio::test]
    async fn subscribers_share_one_channel_and_keep_order() {
        let groups = GroupMap::new(16);
        let group = GroupName::user(1);

        let (mut first, created) = groups.subscribe(&group);
        assert!(created);
        let (mut second, created) = groups.subscribe(&group);
        assert!(!created);
        assert_eq!(groups.len(), 1);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(groups.deliver(&group, left(a)), 2);
        assert_eq!(groups.deliver(&group, left(b)), 2);

        for rx in [&mut first, &mut second] {
            assert_eq!(*rx.recv().await.unwrap(), ServerEvent::RoomLeft { room_id: a });
            assert_eq!(*rx.recv().await.unwrap(), ServerEvent::RoomLeft { room_id: b });
        }
    }

    #[test]
    fn release_only_drops_idle_channels() {
        let groups = GroupMap::new(16);
        let group = GroupName::user(7);

        let (rx, _) = groups.subscribe(&group);
        assert!(!groups.release(&group));
        assert!(groups.contains(&group));

        let other = GroupName::user(8);
        let (_other_rx, _) = groups.subscribe(&other);
        let mut names = groups.names();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(names, vec![group.clone(), other.clone()]);

        drop(rx);
        assert!(groups.release(&group));
        assert_eq!(groups.names(), vec![other.clone()]);
        assert!(!groups.release(&other));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.deliver(&group, left(Uuid::new_v4())), 0);
    }
}
