//! 在线状态内存实现（用于测试与本地演示）。

use crate::error::StorageError;
use crate::liveness::{HubStream, LivenessStore, now_epoch_ms};
use domain::{ChangedAttributes, HubRecord, HubState, PartitionId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::RwLock;

/// 使用 RwLock + HashMap 的内存在线状态存储。
pub struct InMemoryLivenessStore {
    hubs: RwLock<HashMap<String, HubRecord>>,
}

impl InMemoryLivenessStore {
    pub fn new() -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_hubs(records: impl IntoIterator<Item = HubRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// 写入或覆盖一条 Hub 记录。
    pub fn upsert(&self, record: HubRecord) {
        if let Ok(mut map) = self.hubs.write() {
            map.insert(record.hub_id.clone(), record);
        }
    }

    /// 当前持久化状态（不存在返回 None）。
    pub fn state_of(&self, hub_id: &str) -> Option<HubState> {
        self.hubs
            .read()
            .ok()
            .and_then(|map| map.get(hub_id).map(|item| item.state))
    }

    fn transition(
        &self,
        hub_id: &str,
        from: HubState,
        to: HubState,
    ) -> Result<ChangedAttributes, StorageError> {
        let mut map = self
            .hubs
            .write()
            .map_err(|_| StorageError::unavailable("lock failed"))?;
        let hub = map
            .get_mut(hub_id)
            .ok_or_else(|| StorageError::NotFound(hub_id.to_string()))?;
        if hub.state != from {
            return Ok(ChangedAttributes::empty());
        }
        hub.state = to;
        let ts_ms = now_epoch_ms();
        Ok(match to {
            HubState::Online => ChangedAttributes::connected(ts_ms),
            _ => ChangedAttributes::disconnected(ts_ms),
        })
    }
}

impl Default for InMemoryLivenessStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LivenessStore for InMemoryLivenessStore {
    async fn find_by_id(&self, hub_id: &str) -> Result<Option<HubRecord>, StorageError> {
        let map = self
            .hubs
            .read()
            .map_err(|_| StorageError::unavailable("lock failed"))?;
        Ok(map.get(hub_id).cloned())
    }

    async fn mark_connected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.transition(hub_id, HubState::Offline, HubState::Online)
    }

    async fn mark_disconnected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.transition(hub_id, HubState::Online, HubState::Offline)
    }

    fn stream_by_partition(&self, partition_id: PartitionId) -> HubStream {
        let items: Vec<HubRecord> = self
            .hubs
            .read()
            .map(|map| {
                let mut items: Vec<HubRecord> = map
                    .values()
                    .filter(|item| item.partition_id == partition_id)
                    .cloned()
                    .collect();
                items.sort_by(|a, b| a.hub_id.cmp(&b.hub_id));
                items
            })
            .unwrap_or_default();
        futures::stream::iter(items.into_iter().map(Ok)).boxed()
    }
}
