//! Redis pub/sub fanout bus, shared by every server process
//!
//! Each process holds one Redis subscription per group that has local subscribers and fans
//! the payloads out through its own [`GroupMap`]. Publishing goes through a pooled
//! connection. Events travel as JSON on the channel `<prefix>:group:<group>`.
//!
//! When the subscriber connection drops, the forwarder reconnects with backoff and
//! subscribes every local group again. Events published during the gap are not replayed.

use crate::dtos::ServerEvent;
use crate::fanout::{FanoutBus, FanoutError, GroupMap, GroupName};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::{PubSubSink, PubSubStream};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, error, info, instrument, warn};

const RECONNECT_MIN_DELAY: Duration = Duration::from_millis(200);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

pub struct RedisFanoutBus {
    pool: Pool,
    /// Serializes SUBSCRIBE/UNSUBSCRIBE with the local map updates.
    /// Replaced by the forwarder after a reconnect.
    sink: Arc<Mutex<PubSubSink>>,
    groups: Arc<GroupMap>,
    key_prefix: String,
}

impl RedisFanoutBus {
    /// Open the publish pool and the subscriber connection, then start forwarding
    /// incoming payloads to local subscribers.
    #[instrument(skip(url, key_prefix))]
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, FanoutError> {
        let key_prefix = key_prefix.into();
        let pool = PoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;

        let client = redis::Client::open(url)?;
        let (sink, stream) = client.get_async_pubsub().await?.split();
        let sink = Arc::new(Mutex::new(sink));
        let groups = Arc::new(GroupMap::new(capacity));

        let forwarder = Forwarder {
            client,
            sink: Arc::downgrade(&sink),
            groups: groups.clone(),
            key_prefix: key_prefix.clone(),
        };
        tokio::spawn(forwarder.run(stream));

        info!("Redis fanout bus connected");
        Ok(Self {
            pool,
            sink,
            groups,
            key_prefix,
        })
    }

    fn channel(&self, group: &GroupName) -> String {
        channel_name(&self.key_prefix, group)
    }
}

fn channel_name(key_prefix: &str, group: &GroupName) -> String {
    format!("{}:group:{}", key_prefix, group)
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(RECONNECT_MAX_DELAY)
}

/// Moves pub/sub payloads into the local [`GroupMap`] and keeps the subscriber
/// connection alive for as long as the bus exists.
struct Forwarder {
    client: redis::Client,
    sink: Weak<Mutex<PubSubSink>>,
    groups: Arc<GroupMap>,
    key_prefix: String,
}

impl Forwarder {
    async fn run(self, mut stream: PubSubStream) {
        loop {
            self.forward(&mut stream).await;
            error!("Redis pub/sub stream closed, events published meanwhile are lost");
            match self.reconnect().await {
                Some(fresh) => stream = fresh,
                None => break,
            }
        }
        debug!("Fanout bus dropped, forwarder stopped");
    }

    async fn forward(&self, stream: &mut PubSubStream) {
        let channel_prefix = format!("{}:group:", self.key_prefix);
        while let Some(msg) = stream.next().await {
            let Some(group) = msg.get_channel_name().strip_prefix(&channel_prefix) else {
                continue;
            };
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(group, "Unreadable pub/sub payload: {:?}", e);
                    continue;
                }
            };
            match serde_json::from_str::<ServerEvent>(&payload) {
                Ok(event) => {
                    let receivers = self
                        .groups
                        .deliver(&GroupName::from_raw(group), Arc::new(event));
                    debug!(group, receivers, "Event forwarded to local subscribers");
                }
                Err(e) => warn!(group, "Discarding undecodable event: {:?}", e),
            }
        }
    }

    /// Retry with exponential backoff until a new connection holds every local group.
    /// `None` once the bus itself has been dropped.
    async fn reconnect(&self) -> Option<PubSubStream> {
        let mut delay = RECONNECT_MIN_DELAY;
        loop {
            tokio::time::sleep(delay).await;
            let sink = self.sink.upgrade()?;
            match self.resubscribe(&sink).await {
                Ok(stream) => {
                    info!("Redis pub/sub reconnected");
                    return Some(stream);
                }
                Err(e) => {
                    delay = next_delay(delay);
                    warn!(retry_in_ms = delay.as_millis() as u64, "Redis pub/sub reconnect failed: {}", e);
                }
            }
        }
    }

    async fn resubscribe(&self, sink: &Mutex<PubSubSink>) -> Result<PubSubStream, FanoutError> {
        let (mut fresh, stream) = self.client.get_async_pubsub().await?.split();

        // held until the swap so no subscribe or release interleaves with the replay
        let mut current = sink.lock().await;
        let groups = self.groups.names();
        for group in &groups {
            fresh.subscribe(channel_name(&self.key_prefix, group)).await?;
        }
        *current = fresh;
        info!(groups = groups.len(), "Local groups subscribed again");
        Ok(stream)
    }
}

#[async_trait]
impl FanoutBus for RedisFanoutBus {
    #[instrument(skip(self, event), fields(group = %group, kind = event.kind()))]
    async fn publish(&self, group: &GroupName, event: &ServerEvent) -> Result<(), FanoutError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.pool.get().await?;
        let receivers: i64 = conn.publish(self.channel(group), payload).await?;
        debug!(receivers, "Event published");
        Ok(())
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn subscribe(
        &self,
        group: &GroupName,
    ) -> Result<Receiver<Arc<ServerEvent>>, FanoutError> {
        let mut sink = self.sink.lock().await;
        if !self.groups.contains(group) {
            // Acknowledged by Redis before returning
            sink.subscribe(self.channel(group)).await?;
            debug!("Redis subscription opened");
        }
        Ok(self.groups.subscribe(group).0)
    }

    #[instrument(skip(self), fields(group = %group))]
    async fn release(&self, group: &GroupName) -> Result<(), FanoutError> {
        let mut sink = self.sink.lock().await;
        if self.groups.release(group) {
            sink.unsubscribe(self.channel(group)).await?;
            debug!("Redis subscription closed");
        }
        Ok(())
    }

    fn holds_group(&self, group: &GroupName) -> bool {
        self.groups.contains(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_up_to_the_cap() {
        let mut delay = RECONNECT_MIN_DELAY;
        let mut seen = Vec::new();
        for _ in 0..10 {
            delay = next_delay(delay);
            seen.push(delay);
        }
        assert_eq!(seen[0], Duration::from_millis(400));
        assert_eq!(seen[1], Duration::from_millis(800));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*seen.last().unwrap(), RECONNECT_MAX_DELAY);
    }

    #[test]
    fn channels_are_namespaced_by_prefix() {
        assert_eq!(channel_name("hub", &GroupName::user(4)), "hub:group:user_4");
    }
}
