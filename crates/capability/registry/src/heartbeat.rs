//! 单个 Hub 的多来源心跳聚合。
//!
//! 每个接入来源（bridge 等）各记一条最近心跳时间，聚合值为其中最大者。
//! 记录只要存在于注册表中，来源集合就不为空：最后一个来源的移除与记录
//! 从注册表中删除在注册表的 `remove_if` 内一步完成。

use domain::PartitionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// 分区加载时写入的临时来源；任一真实来源的信号到达即被丢弃。
pub const PARTITION_LOAD_SOURCE: &str = "partition-load";

#[derive(Debug)]
struct Sources {
    by_source: HashMap<String, i64>,
    last_seen_ms: Option<i64>,
}

impl Sources {
    fn single(source_id: &str, ts_ms: i64) -> Self {
        let mut by_source = HashMap::with_capacity(4);
        by_source.insert(source_id.to_string(), ts_ms);
        Self {
            by_source,
            last_seen_ms: Some(ts_ms),
        }
    }

    fn recompute(&mut self) {
        self.last_seen_ms = self.by_source.values().copied().max();
    }
}

/// 一个被跟踪 Hub 的心跳记录。
#[derive(Debug)]
pub struct HeartbeatRecord {
    hub_id: String,
    partition_id: PartitionId,
    sources: Mutex<Sources>,
    connect_pending: AtomicBool,
}

impl HeartbeatRecord {
    /// 首次心跳创建的记录，待向存储对账上线。
    pub(crate) fn new(hub_id: &str, partition_id: PartitionId, source_id: &str, ts_ms: i64) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            partition_id,
            sources: Mutex::new(Sources::single(source_id, ts_ms)),
            connect_pending: AtomicBool::new(true),
        }
    }

    /// 分区加载创建的记录；`connect_pending` 表示存储尚未记为在线。
    pub(crate) fn loaded(
        hub_id: &str,
        partition_id: PartitionId,
        ts_ms: i64,
        connect_pending: bool,
    ) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            partition_id,
            sources: Mutex::new(Sources::single(PARTITION_LOAD_SOURCE, ts_ms)),
            connect_pending: AtomicBool::new(connect_pending),
        }
    }

    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// 所有来源中最近的心跳时间。
    pub fn last_seen_ms(&self) -> Option<i64> {
        self.lock().last_seen_ms
    }

    /// 当前来源（已排序）。
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.lock().by_source.keys().cloned().collect();
        sources.sort();
        sources
    }

    pub(crate) fn is_expired(&self, expiry_ms: i64) -> bool {
        match self.lock().last_seen_ms {
            Some(last_seen_ms) => last_seen_ms < expiry_ms,
            None => true,
        }
    }

    /// 刷新来源心跳。
    pub(crate) fn refresh(&self, source_id: &str, ts_ms: i64) {
        let mut sources = self.lock();
        if source_id != PARTITION_LOAD_SOURCE {
            sources.by_source.remove(PARTITION_LOAD_SOURCE);
        }
        sources.by_source.insert(source_id.to_string(), ts_ms);
        sources.recompute();
    }

    /// 移除来源，并剪除早于 `expiry_ms` 的其余来源；返回是否已无来源。
    pub(crate) fn remove_source(&self, source_id: &str, expiry_ms: i64) -> bool {
        let mut sources = self.lock();
        sources.by_source.remove(source_id);
        sources.by_source.remove(PARTITION_LOAD_SOURCE);
        sources.by_source.retain(|_, ts_ms| *ts_ms >= expiry_ms);
        sources.recompute();
        sources.by_source.is_empty()
    }

    /// 领取一次上线对账；并发调用中只有一个返回 true。
    pub(crate) fn take_connect_pending(&self) -> bool {
        self.connect_pending.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_connect_pending(&self) {
        self.connect_pending.store(true, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Sources> {
        self.sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
