//! 分区对账：分区被撤销时静默停止跟踪，新获得分区时并行批量加载。
//!
//! 归属迁移不是可达性变化，这里既不写存储也不广播事件。

use crate::registry::LivenessRegistry;
use async_trait::async_trait;
use domain::{PartitionDelta, PartitionId};
use fleet_partition::PartitionListener;
use fleet_storage::StorageError;
use fleet_telemetry::{record_partition_load, record_partition_load_failure};
use futures::{FutureExt, StreamExt};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 一次差量的应用结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 因分区撤销而停止跟踪的 Hub 数。
    pub untracked: usize,
    /// 批量加载新建的记录数。
    pub loaded: usize,
    /// 加载失败（或被取消）的分区。
    pub failed_partitions: BTreeSet<PartitionId>,
}

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("partition load cancelled")]
    Cancelled,
    #[error("partition load panicked")]
    Panicked,
}

pub struct PartitionReconciler {
    registry: Arc<LivenessRegistry>,
    cancel: CancellationToken,
}

impl PartitionReconciler {
    pub fn new(registry: Arc<LivenessRegistry>, cancel: CancellationToken) -> Self {
        Self { registry, cancel }
    }

    /// 先处理撤销，再并行加载新增分区；所有分区加载结束后返回。
    pub async fn apply(&self, delta: &PartitionDelta) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !delta.removed.is_empty() {
            report.untracked = self.registry.untrack_partitions(&delta.removed);
            info!(
                target: "fleet.partition",
                partitions = ?delta.removed,
                untracked = report.untracked,
                "partitions_revoked"
            );
        }
        if delta.added.is_empty() {
            return report;
        }

        let loaded_at_ms = self.registry.now_ms();
        let mut loads = JoinSet::new();
        for partition_id in delta.added.iter().copied() {
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            loads.spawn(async move {
                let result =
                    AssertUnwindSafe(load_partition(&registry, partition_id, loaded_at_ms, &cancel))
                        .catch_unwind()
                        .await
                        .unwrap_or(Err(LoadError::Panicked));
                (partition_id, result)
            });
        }

        while let Some(joined) = loads.join_next().await {
            match joined {
                Ok((partition_id, Ok(loaded))) => {
                    record_partition_load();
                    report.loaded += loaded;
                    debug!(
                        target: "fleet.partition",
                        partition_id,
                        loaded,
                        "partition_loaded"
                    );
                }
                Ok((partition_id, Err(err))) => {
                    record_partition_load_failure();
                    report.failed_partitions.insert(partition_id);
                    warn!(
                        target: "fleet.partition",
                        partition_id,
                        error = %err,
                        "partition_load_failed"
                    );
                }
                Err(err) => {
                    record_partition_load_failure();
                    warn!(target: "fleet.partition", error = %err, "partition_load_task_failed");
                }
            }
        }
        info!(
            target: "fleet.partition",
            partitions = ?delta.added,
            loaded = report.loaded,
            failed = report.failed_partitions.len(),
            tracked = self.registry.count(),
            "partitions_loaded"
        );
        report
    }
}

async fn load_partition(
    registry: &LivenessRegistry,
    partition_id: PartitionId,
    loaded_at_ms: i64,
    cancel: &CancellationToken,
) -> Result<usize, LoadError> {
    let mut hubs = registry.store().stream_by_partition(partition_id);
    let mut loaded = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoadError::Cancelled),
            next = hubs.next() => next,
        };
        let Some(hub) = next else {
            break;
        };
        if registry.track_loaded(&hub?, partition_id, loaded_at_ms) {
            loaded += 1;
        }
    }
    Ok(loaded)
}

#[async_trait]
impl PartitionListener for PartitionReconciler {
    async fn on_partitions_changed(&self, delta: PartitionDelta) {
        self.apply(&delta).await;
    }
}
