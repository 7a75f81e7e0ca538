//! 日志初始化与在线注册表计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connected: u64,
    pub disconnected: u64,
    pub timed_out: u64,
    pub superseded: u64,
    pub untracked: u64,
    pub store_failures: u64,
    pub unknown_hubs: u64,
    pub partition_loads: u64,
    pub partition_load_failures: u64,
    pub events_published: u64,
    pub event_failures: u64,
}

/// 在线注册表计数器。
pub struct TelemetryMetrics {
    connected: AtomicU64,
    disconnected: AtomicU64,
    timed_out: AtomicU64,
    superseded: AtomicU64,
    untracked: AtomicU64,
    store_failures: AtomicU64,
    unknown_hubs: AtomicU64,
    partition_loads: AtomicU64,
    partition_load_failures: AtomicU64,
    events_published: AtomicU64,
    event_failures: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            disconnected: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            untracked: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            unknown_hubs: AtomicU64::new(0),
            partition_loads: AtomicU64::new(0),
            partition_load_failures: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            event_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            disconnected: self.disconnected.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            untracked: self.untracked.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            unknown_hubs: self.unknown_hubs.load(Ordering::Relaxed),
            partition_loads: self.partition_loads.load(Ordering::Relaxed),
            partition_load_failures: self.partition_load_failures.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            event_failures: self.event_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录新上线的 Hub（新建跟踪记录）。
pub fn record_connected() {
    metrics().connected.fetch_add(1, Ordering::Relaxed);
}

/// 记录因断开信号离线的 Hub。
pub fn record_disconnected() {
    metrics().disconnected.fetch_add(1, Ordering::Relaxed);
}

/// 记录超时扫描移除的 Hub。
pub fn record_timed_out() {
    metrics().timed_out.fetch_add(1, Ordering::Relaxed);
}

/// 记录被并发心跳抢先的断开信号。
pub fn record_superseded() {
    metrics().superseded.fetch_add(1, Ordering::Relaxed);
}

/// 记录分区撤销时移除的记录数。
pub fn record_untracked(count: u64) {
    metrics().untracked.fetch_add(count, Ordering::Relaxed);
}

/// 记录存储对账失败次数。
pub fn record_store_failure() {
    metrics().store_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录存储中不存在的 Hub（跟踪不一致）。
pub fn record_unknown_hub() {
    metrics().unknown_hubs.fetch_add(1, Ordering::Relaxed);
}

/// 记录分区加载完成次数。
pub fn record_partition_load() {
    metrics().partition_loads.fetch_add(1, Ordering::Relaxed);
}

/// 记录分区加载失败次数。
pub fn record_partition_load_failure() {
    metrics()
        .partition_load_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录事件发布成功次数。
pub fn record_event_published() {
    metrics().events_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录事件发布失败次数。
pub fn record_event_failure() {
    metrics().event_failures.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_counters_start_at_zero() {
        let metrics = TelemetryMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn global_counters_accumulate() {
        let before = metrics().snapshot();
        record_untracked(3);
        record_timed_out();
        let after = metrics().snapshot();
        assert!(after.untracked >= before.untracked + 3);
        assert!(after.timed_out > before.timed_out);
    }
}
