//! Hub 在线注册表。
//!
//! 记录存在于注册表 ⇔ 本进程认为该 Hub 在线。记录的创建与删除是判断
//! "是否发生迁移" 的唯一依据；存储对账与事件广播在锁外进行，只决定
//! 是否通知外部。

use crate::clock::Clock;
use crate::error::RegistryError;
use crate::heartbeat::HeartbeatRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::{ChangedAttributes, HubRecord, HubState, PartitionId};
use fleet_events::EventEmitter;
use fleet_storage::LivenessStore;
use fleet_telemetry::{
    record_connected, record_disconnected, record_store_failure, record_superseded,
    record_unknown_hub, record_untracked,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// 离线对账的触发原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisconnectCause {
    /// 已跟踪 Hub 的最后一个来源断开。
    Absence,
    /// 未跟踪 Hub 收到断开（重复或迟到的信号）。
    UntrackedAbsence,
    /// 超时扫描。
    Timeout,
    /// 上次对账失败后的重试。
    Retry,
}

impl DisconnectCause {
    fn as_str(&self) -> &'static str {
        match self {
            DisconnectCause::Absence => "absence",
            DisconnectCause::UntrackedAbsence => "untracked_absence",
            DisconnectCause::Timeout => "timeout",
            DisconnectCause::Retry => "retry",
        }
    }
}

/// 断开信号的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceOutcome {
    /// 最后一个来源移除，记录已删除。
    Offline,
    /// 仍有其他来源，保持在线。
    StillReachable,
    /// 记录已被并发操作替换或删除，本次信号作废。
    Superseded,
    /// 未跟踪的 Hub，仅做存储对账。
    Untracked,
}

pub struct LivenessRegistry {
    hubs: DashMap<String, Arc<HeartbeatRecord>>,
    /// 离线对账失败、等待下次扫描重试的 Hub（值为已知分区）。
    pending_disconnects: Mutex<HashMap<String, Option<PartitionId>>>,
    store: Arc<dyn LivenessStore>,
    emitter: EventEmitter,
    clock: Arc<dyn Clock>,
    offline_timeout_ms: i64,
}

impl LivenessRegistry {
    pub fn new(
        store: Arc<dyn LivenessStore>,
        emitter: EventEmitter,
        clock: Arc<dyn Clock>,
        offline_timeout: Duration,
    ) -> Self {
        Self {
            hubs: DashMap::new(),
            pending_disconnects: Mutex::new(HashMap::new()),
            store,
            emitter,
            clock,
            offline_timeout_ms: offline_timeout.as_millis() as i64,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn offline_timeout_ms(&self) -> i64 {
        self.offline_timeout_ms
    }

    pub(crate) fn store(&self) -> &Arc<dyn LivenessStore> {
        &self.store
    }

    /// 是否在线（仅查内存，不访问存储）。
    ///
    /// 只对本进程拥有分区内的 Hub 有意义。
    pub fn is_online(&self, hub_id: &str) -> bool {
        self.hubs.contains_key(hub_id)
    }

    /// 当前跟踪的 Hub 数量。
    pub fn count(&self) -> usize {
        self.hubs.len()
    }

    /// 当前记录的快照。
    pub fn get(&self, hub_id: &str) -> Option<Arc<HeartbeatRecord>> {
        self.hubs.get(hub_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 以当前时间记录心跳。
    pub async fn record_heartbeat(&self, hub_id: &str, partition_id: PartitionId, source_id: &str) {
        let now_ms = self.now_ms();
        self.record_heartbeat_at(hub_id, partition_id, source_id, now_ms)
            .await
    }

    /// 记录来自 `source_id` 的心跳；首次心跳创建记录并向存储对账上线。
    pub async fn record_heartbeat_at(
        &self,
        hub_id: &str,
        partition_id: PartitionId,
        source_id: &str,
        now_ms: i64,
    ) {
        let record = match self.hubs.entry(hub_id.to_string()) {
            Entry::Occupied(entry) => {
                entry.get().refresh(source_id, now_ms);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                let record = Arc::new(HeartbeatRecord::new(hub_id, partition_id, source_id, now_ms));
                entry.insert(Arc::clone(&record));
                record_connected();
                debug!(
                    target: "fleet.registry",
                    hub_id = %hub_id,
                    partition_id,
                    source_id = %source_id,
                    "hub_tracked"
                );
                record
            }
        };
        self.forget_pending_disconnect(hub_id);

        if !record.take_connect_pending() {
            return;
        }
        if let Err(err) = self.reconcile_connected(hub_id).await {
            if err.is_unknown_hub() {
                record_unknown_hub();
                warn!(target: "fleet.registry", hub_id = %hub_id, "untracked_hub_connected");
                return;
            }
            record_store_failure();
            // 下一次心跳重试
            record.set_connect_pending();
            warn!(
                target: "fleet.registry",
                hub_id = %hub_id,
                error = %err,
                "hub_connect_reconcile_failed"
            );
        }
    }

    /// 以当前时间记录断开。
    pub async fn record_absence(&self, hub_id: &str, source_id: &str) -> AbsenceOutcome {
        let now_ms = self.now_ms();
        self.record_absence_at(hub_id, source_id, now_ms).await
    }

    /// 记录 `source_id` 的断开；最后一个来源断开时删除记录并对账离线。
    pub async fn record_absence_at(
        &self,
        hub_id: &str,
        source_id: &str,
        now_ms: i64,
    ) -> AbsenceOutcome {
        let Some(record) = self.get(hub_id) else {
            debug!(target: "fleet.registry", hub_id = %hub_id, "absence_for_untracked_hub");
            self.disconnect(hub_id, None, DisconnectCause::UntrackedAbsence)
                .await;
            return AbsenceOutcome::Untracked;
        };
        self.absence_for_record(hub_id, &record, source_id, now_ms)
            .await
    }

    /// 对已取得的记录执行断开；记录已被替换或删除时返回 `Superseded`。
    pub(crate) async fn absence_for_record(
        &self,
        hub_id: &str,
        record: &Arc<HeartbeatRecord>,
        source_id: &str,
        now_ms: i64,
    ) -> AbsenceOutcome {
        let expiry_ms = now_ms - self.offline_timeout_ms;
        let mut outcome = AbsenceOutcome::Superseded;
        let removed = self
            .hubs
            .remove_if(hub_id, |_, current| {
                if !Arc::ptr_eq(current, record) {
                    return false;
                }
                if record.remove_source(source_id, expiry_ms) {
                    true
                } else {
                    outcome = AbsenceOutcome::StillReachable;
                    false
                }
            })
            .is_some();

        if removed {
            record_disconnected();
            debug!(
                target: "fleet.registry",
                hub_id = %hub_id,
                source_id = %source_id,
                "hub_disconnected"
            );
            self.disconnect(hub_id, Some(record.partition_id()), DisconnectCause::Absence)
                .await;
            return AbsenceOutcome::Offline;
        }
        match outcome {
            AbsenceOutcome::StillReachable => debug!(
                target: "fleet.registry",
                hub_id = %hub_id,
                source_id = %source_id,
                "hub_still_reachable"
            ),
            _ => {
                record_superseded();
                debug!(
                    target: "fleet.registry",
                    hub_id = %hub_id,
                    source_id = %source_id,
                    "hub_absence_superseded"
                );
            }
        }
        outcome
    }

    /// 无条件停止跟踪（不对账、不广播），用于分区撤销。
    pub fn untrack(&self, hub_id: &str) -> bool {
        self.hubs.remove(hub_id).is_some()
    }

    /// 停止跟踪属于给定分区的全部 Hub，返回移除数量。
    pub fn untrack_partitions(&self, removed: &BTreeSet<PartitionId>) -> usize {
        if removed.is_empty() {
            return 0;
        }
        let candidates: Vec<String> = self
            .hubs
            .iter()
            .filter(|entry| removed.contains(&entry.value().partition_id()))
            .map(|entry| entry.key().clone())
            .collect();
        let mut untracked = 0;
        for hub_id in candidates {
            let dropped = self
                .hubs
                .remove_if(&hub_id, |_, current| {
                    removed.contains(&current.partition_id())
                })
                .is_some();
            if dropped {
                untracked += 1;
            }
        }
        if let Ok(mut pending) = self.pending_disconnects.lock() {
            pending.retain(|_, partition| !matches!(partition, Some(p) if removed.contains(p)));
        }
        record_untracked(untracked as u64);
        untracked
    }

    /// 分区加载：记录不存在时以 `ts_ms` 建立（DOWN 终态跳过），已存在不覆盖。
    pub fn track_loaded(&self, hub: &HubRecord, partition_id: PartitionId, ts_ms: i64) -> bool {
        if hub.state.is_down() {
            return false;
        }
        match self.hubs.entry(hub.hub_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let connect_pending = hub.state != HubState::Online;
                entry.insert(Arc::new(HeartbeatRecord::loaded(
                    &hub.hub_id,
                    partition_id,
                    ts_ms,
                    connect_pending,
                )));
                true
            }
        }
    }

    /// 已过期记录的快照（不持有任何锁返回）。
    pub(crate) fn expired(&self, expiry_ms: i64) -> Vec<Arc<HeartbeatRecord>> {
        self.hubs
            .iter()
            .filter(|entry| entry.value().is_expired(expiry_ms))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// 仅当注册表中仍是同一条记录且仍过期时删除。
    pub(crate) fn remove_if_expired(&self, record: &Arc<HeartbeatRecord>, expiry_ms: i64) -> bool {
        self.hubs
            .remove_if(record.hub_id(), |_, current| {
                Arc::ptr_eq(current, record) && current.is_expired(expiry_ms)
            })
            .is_some()
    }

    /// 取出等待重试的离线对账（已重新上线的 Hub 不再重试）。
    pub(crate) fn take_pending_disconnects(&self) -> Vec<(String, Option<PartitionId>)> {
        let pending = match self.pending_disconnects.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return Vec::new(),
        };
        pending
            .into_iter()
            .filter(|(hub_id, _)| !self.hubs.contains_key(hub_id))
            .collect()
    }

    /// 等待重试的离线对账数量。
    pub fn pending_disconnect_count(&self) -> usize {
        self.pending_disconnects
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }

    fn forget_pending_disconnect(&self, hub_id: &str) {
        if let Ok(mut pending) = self.pending_disconnects.lock() {
            pending.remove(hub_id);
        }
    }

    /// 离线对账并在真实迁移时广播；失败只记录日志，存储不可用时排队重试。
    pub(crate) async fn disconnect(
        &self,
        hub_id: &str,
        partition_id: Option<PartitionId>,
        cause: DisconnectCause,
    ) {
        let broadcast = cause == DisconnectCause::Timeout;
        match self.reconcile_disconnected(hub_id, broadcast).await {
            Ok(true) => debug!(
                target: "fleet.registry",
                hub_id = %hub_id,
                cause = cause.as_str(),
                "hub_offline_published"
            ),
            Ok(false) => {}
            Err(err) if err.is_unknown_hub() => {
                record_unknown_hub();
                warn!(
                    target: "fleet.registry",
                    hub_id = %hub_id,
                    cause = cause.as_str(),
                    "untracked_hub_disconnected"
                );
            }
            Err(err) => {
                record_store_failure();
                warn!(
                    target: "fleet.registry",
                    hub_id = %hub_id,
                    cause = cause.as_str(),
                    error = %err,
                    "hub_disconnect_reconcile_failed"
                );
                if let RegistryError::Storage(_) = err {
                    if let Ok(mut pending) = self.pending_disconnects.lock() {
                        pending.insert(hub_id.to_string(), partition_id);
                    }
                }
            }
        }
    }

    /// 返回是否广播了离线事件。
    ///
    /// `broadcast` 为真（超时）时，只要 Hub 存在就广播离线事件；变更属性
    /// 仍只在存储发生迁移时携带。
    async fn reconcile_disconnected(
        &self,
        hub_id: &str,
        broadcast: bool,
    ) -> Result<bool, RegistryError> {
        let Some(hub) = self.store.find_by_id(hub_id).await? else {
            return Err(fleet_storage::StorageError::NotFound(hub_id.to_string()).into());
        };
        let (changes, store_err) = match self.store.mark_disconnected(hub_id).await {
            Ok(changes) => (changes, None),
            Err(err) => (ChangedAttributes::empty(), Some(err)),
        };
        let publish = broadcast || !changes.is_empty();
        let published = if publish {
            self.emitter
                .emit_disconnected(hub_id, hub.place_id.as_deref(), changes)
                .await
        } else {
            Ok(())
        };
        // 存储失败优先返回，保证进入重试队列
        if let Some(err) = store_err {
            return Err(err.into());
        }
        published?;
        Ok(publish)
    }

    /// 返回是否广播了上线事件。
    async fn reconcile_connected(&self, hub_id: &str) -> Result<bool, RegistryError> {
        let changes = self.store.mark_connected(hub_id).await?;
        if changes.is_empty() {
            return Ok(false);
        }
        debug!(target: "fleet.registry", hub_id = %hub_id, "hub_marked_online");
        // 需要 place 才能限定广播范围
        let Some(hub) = self.store.find_by_id(hub_id).await? else {
            return Err(fleet_storage::StorageError::NotFound(hub_id.to_string()).into());
        };
        self.emitter
            .emit_connected(hub_id, hub.place_id.as_deref(), changes)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use fleet_events::{HubEvent, InMemoryEventBus, StaticPopulationResolver};
    use fleet_storage::InMemoryLivenessStore;

    fn registry() -> (LivenessRegistry, Arc<InMemoryEventBus>) {
        let store = Arc::new(InMemoryLivenessStore::with_hubs([HubRecord::new(
            "H1",
            Some("place-H1".to_string()),
            1,
            HubState::Offline,
        )]));
        let bus = Arc::new(InMemoryEventBus::new());
        let emitter = EventEmitter::new(bus.clone(), Arc::new(StaticPopulationResolver::new()));
        let registry = LivenessRegistry::new(
            store,
            emitter,
            Arc::new(ManualClock::new(0)),
            Duration::from_millis(600_000),
        );
        (registry, bus)
    }

    fn disconnects(bus: &InMemoryEventBus) -> usize {
        bus.events().iter().filter(|event| event.is_disconnected()).count()
    }

    #[tokio::test]
    async fn heartbeat_after_expiry_scan_wins_over_removal() {
        let (registry, bus) = registry();
        registry.record_heartbeat_at("H1", 1, "bridge-a", 0).await;
        let scanned = registry.expired(100);
        assert_eq!(scanned.len(), 1);

        registry.record_heartbeat_at("H1", 1, "bridge-a", 200).await;
        assert!(!registry.remove_if_expired(&scanned[0], 100));
        assert!(registry.is_online("H1"));
        assert_eq!(disconnects(&bus), 0);
    }

    #[tokio::test]
    async fn replaced_record_survives_stale_expiry() {
        let (registry, _bus) = registry();
        registry.record_heartbeat_at("H1", 1, "bridge-a", 0).await;
        let scanned = registry.expired(100);
        registry.untrack("H1");
        registry.record_heartbeat_at("H1", 1, "bridge-a", 0).await;

        // 新记录同样过期，但身份不同
        assert!(!registry.remove_if_expired(&scanned[0], 100));
        assert!(registry.is_online("H1"));
        assert_eq!(registry.expired(100).len(), 1);
    }

    #[tokio::test]
    async fn absence_against_replaced_record_is_superseded() {
        let (registry, bus) = registry();
        registry.record_heartbeat_at("H1", 1, "bridge-a", 0).await;
        let stale = registry.get("H1").expect("tracked");
        registry.untrack("H1");
        registry.record_heartbeat_at("H1", 1, "bridge-a", 10).await;
        bus.take();

        let outcome = registry
            .absence_for_record("H1", &stale, "bridge-a", 20)
            .await;
        assert_eq!(outcome, AbsenceOutcome::Superseded);
        assert!(registry.is_online("H1"));
        assert!(!Arc::ptr_eq(&stale, &registry.get("H1").expect("tracked")));
        assert_eq!(disconnects(&bus), 0);

        // 新记录仍按正常路径下线
        assert_eq!(
            registry.record_absence_at("H1", "bridge-a", 30).await,
            AbsenceOutcome::Offline
        );
        assert_eq!(disconnects(&bus), 1);
    }

    #[tokio::test]
    async fn absence_against_untracked_record_is_superseded() {
        let (registry, bus) = registry();
        registry.record_heartbeat_at("H1", 1, "bridge-a", 0).await;
        let stale = registry.get("H1").expect("tracked");
        registry.untrack("H1");

        let outcome = registry
            .absence_for_record("H1", &stale, "bridge-a", 20)
            .await;
        assert_eq!(outcome, AbsenceOutcome::Superseded);
        assert!(!registry.is_online("H1"));
        assert!(!bus.events().iter().any(HubEvent::is_disconnected));
    }
}
