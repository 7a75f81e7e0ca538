#![allow(dead_code)]

use async_trait::async_trait;
use domain::{ChangedAttributes, HubRecord, HubState, PartitionId};
use fleet_events::{EventEmitter, HubEvent, InMemoryEventBus, StaticPopulationResolver};
use fleet_registry::{LivenessRegistry, ManualClock};
use fleet_storage::{HubStream, InMemoryLivenessStore, LivenessStore, StorageError};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OFFLINE_TIMEOUT_MS: i64 = 600_000;

pub fn hub(hub_id: &str, partition_id: PartitionId, state: HubState) -> HubRecord {
    HubRecord::new(hub_id, Some(format!("place-{hub_id}")), partition_id, state)
}

/// 可注入故障的存储包装。
pub struct FlakyStore {
    pub inner: InMemoryLivenessStore,
    unavailable: AtomicBool,
    failing_hubs: Mutex<BTreeSet<String>>,
    failing_partitions: Mutex<BTreeSet<PartitionId>>,
    panicking_partitions: Mutex<BTreeSet<PartitionId>>,
}

impl FlakyStore {
    pub fn new(hubs: impl IntoIterator<Item = HubRecord>) -> Self {
        Self {
            inner: InMemoryLivenessStore::with_hubs(hubs),
            unavailable: AtomicBool::new(false),
            failing_hubs: Mutex::new(BTreeSet::new()),
            failing_partitions: Mutex::new(BTreeSet::new()),
            panicking_partitions: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_hub(&self, hub_id: &str) {
        self.failing_hubs.lock().unwrap().insert(hub_id.to_string());
    }

    pub fn heal_hub(&self, hub_id: &str) {
        self.failing_hubs.lock().unwrap().remove(hub_id);
    }

    pub fn fail_partition(&self, partition_id: PartitionId) {
        self.failing_partitions.lock().unwrap().insert(partition_id);
    }

    pub fn panic_partition(&self, partition_id: PartitionId) {
        self.panicking_partitions.lock().unwrap().insert(partition_id);
    }

    fn check(&self, hub_id: &str) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst)
            || self.failing_hubs.lock().unwrap().contains(hub_id)
        {
            return Err(StorageError::unavailable("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl LivenessStore for FlakyStore {
    async fn find_by_id(&self, hub_id: &str) -> Result<Option<HubRecord>, StorageError> {
        self.check(hub_id)?;
        self.inner.find_by_id(hub_id).await
    }

    async fn mark_connected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.check(hub_id)?;
        self.inner.mark_connected(hub_id).await
    }

    async fn mark_disconnected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.check(hub_id)?;
        self.inner.mark_disconnected(hub_id).await
    }

    fn stream_by_partition(&self, partition_id: PartitionId) -> HubStream {
        if self.panicking_partitions.lock().unwrap().contains(&partition_id) {
            panic!("injected panic while streaming partition {partition_id}");
        }
        if self.failing_partitions.lock().unwrap().contains(&partition_id) {
            // 先返回一条记录再失败，模拟加载中途断开
            let first = self.inner.stream_by_partition(partition_id).take(1);
            let failure = futures::stream::iter([Err(StorageError::unavailable("injected failure"))]);
            return first.chain(failure).boxed();
        }
        self.inner.stream_by_partition(partition_id)
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub bus: Arc<InMemoryEventBus>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<LivenessRegistry>,
}

impl Harness {
    pub fn new(hubs: impl IntoIterator<Item = HubRecord>) -> Self {
        let store = Arc::new(FlakyStore::new(hubs));
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(0));
        let emitter = EventEmitter::new(bus.clone(), Arc::new(StaticPopulationResolver::new()));
        let registry = Arc::new(LivenessRegistry::new(
            store.clone(),
            emitter,
            clock.clone(),
            Duration::from_millis(OFFLINE_TIMEOUT_MS as u64),
        ));
        Self {
            store,
            bus,
            clock,
            registry,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<HubRecord>::new())
    }

    pub fn state_of(&self, hub_id: &str) -> Option<HubState> {
        self.store.inner.state_of(hub_id)
    }

    pub fn disconnects(&self) -> Vec<HubEvent> {
        self.bus
            .events()
            .into_iter()
            .filter(HubEvent::is_disconnected)
            .collect()
    }

    pub fn connects(&self) -> Vec<HubEvent> {
        self.bus
            .events()
            .into_iter()
            .filter(|event| !event.is_disconnected())
            .collect()
    }
}
