//! In-process fanout bus, valid only while every session lives in one process

use crate::dtos::ServerEvent;
use crate::fanout::{FanoutBus, FanoutError, GroupMap, GroupName};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, instrument};

pub struct LocalFanoutBus {
    groups: GroupMap,
}

impl LocalFanoutBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: GroupMap::new(capacity),
        }
    }
}

#[async_trait]
impl FanoutBus for LocalFanoutBus {
    #[instrument(skip(self, event), fields(group = %group, kind = event.kind()))]
    async fn publish(&self, group: &GroupName, event: &ServerEvent) -> Result<(), FanoutError> {
        let receivers = self.groups.deliver(group, Arc::new(event.clone()));
        debug!(receivers, "Event published");
        Ok(())
    }

    async fn subscribe(
        &self,
        group: &GroupName,
    ) -> Result<Receiver<Arc<ServerEvent>>, FanoutError> {
        Ok(self.groups.subscribe(group).0)
    }

    async fn release(&self, group: &GroupName) -> Result<(), FanoutError> {
        self.groups.release(group);
        Ok(())
    }

    fn holds_group(&self, group: &GroupName) -> bool {
        self.groups.contains(group)
    }
}
