//! 超时扫描。
//!
//! 固定间隔扫描注册表，最近心跳早于 `now - offline_timeout` 的记录按
//! 身份删除后走与断开信号相同的离线对账路径。单个 Hub 的失败不影响
//! 其余 Hub，失败的对账在下次扫描时重试。

use crate::registry::{DisconnectCause, LivenessRegistry};
use fleet_telemetry::record_timed_out;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct TimeoutSweeper {
    registry: Arc<LivenessRegistry>,
    interval: Duration,
}

impl TimeoutSweeper {
    pub fn new(registry: Arc<LivenessRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 以当前时间执行一次扫描，返回超时删除的数量。
    pub async fn run_once(&self) -> usize {
        let now_ms = self.registry.now_ms();
        self.run_once_at(now_ms).await
    }

    pub async fn run_once_at(&self, now_ms: i64) -> usize {
        for (hub_id, partition_id) in self.registry.take_pending_disconnects() {
            self.registry
                .disconnect(&hub_id, partition_id, DisconnectCause::Retry)
                .await;
        }

        let expiry_ms = now_ms - self.registry.offline_timeout_ms();
        let mut timed_out = 0;
        for record in self.registry.expired(expiry_ms) {
            // 扫描期间收到心跳或断开的记录不再处理
            if !self.registry.remove_if_expired(&record, expiry_ms) {
                continue;
            }
            timed_out += 1;
            record_timed_out();
            debug!(
                target: "fleet.registry",
                hub_id = %record.hub_id(),
                last_seen_ms = ?record.last_seen_ms(),
                "hub_timed_out"
            );
            self.registry
                .disconnect(
                    record.hub_id(),
                    Some(record.partition_id()),
                    DisconnectCause::Timeout,
                )
                .await;
        }
        if timed_out > 0 {
            info!(
                target: "fleet.registry",
                timed_out,
                tracked = self.registry.count(),
                "timeout_sweep_completed"
            );
        }
        timed_out
    }

    /// 启动周期扫描；取消后不再开始新的扫描。
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            debug!(target: "fleet.registry", "timeout_sweeper_stopped");
        })
    }
}
