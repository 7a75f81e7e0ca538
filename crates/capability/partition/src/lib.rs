//! 分区归属：记录本进程拥有的分区集合，并把每次变更以互不相交的
//! `PartitionDelta` 推送给监听者。

use async_trait::async_trait;
use domain::{PartitionDelta, PartitionId};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 变更广播通道容量。
const DELTA_CHANNEL_CAPACITY: usize = 16;

/// 分区归属变更监听者。
#[async_trait]
pub trait PartitionListener: Send + Sync {
    /// 按变更发生顺序调用；返回即视为该变更已应用。
    async fn on_partitions_changed(&self, delta: PartitionDelta);
}

/// 本进程的分区归属表。
pub struct PartitionMembership {
    partition_count: u32,
    owned: Mutex<BTreeSet<PartitionId>>,
    tx: broadcast::Sender<PartitionDelta>,
}

impl PartitionMembership {
    pub fn new(partition_count: u32) -> Self {
        let (tx, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);
        Self {
            partition_count,
            owned: Mutex::new(BTreeSet::new()),
            tx,
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// 当前拥有的分区。
    pub fn owned(&self) -> BTreeSet<PartitionId> {
        self.owned
            .lock()
            .map(|owned| owned.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PartitionDelta> {
        self.tx.subscribe()
    }

    /// 用新的归属集合替换当前集合，广播并返回差量（无变化时不广播）。
    ///
    /// 超出分区空间的编号会被忽略。
    pub fn assign(&self, partitions: impl IntoIterator<Item = PartitionId>) -> PartitionDelta {
        let next: BTreeSet<PartitionId> = partitions.into_iter().collect();
        self.update(|_| next)
    }

    /// 在当前集合上新增分区。
    pub fn grant(&self, partitions: impl IntoIterator<Item = PartitionId>) -> PartitionDelta {
        self.update(|owned| owned.iter().copied().chain(partitions).collect())
    }

    /// 从当前集合撤销分区。
    pub fn revoke(&self, partitions: impl IntoIterator<Item = PartitionId>) -> PartitionDelta {
        let revoked: BTreeSet<PartitionId> = partitions.into_iter().collect();
        self.update(|owned| owned.difference(&revoked).copied().collect())
    }

    /// 在锁内计算新集合、替换并广播。
    fn update(
        &self,
        next: impl FnOnce(&BTreeSet<PartitionId>) -> BTreeSet<PartitionId>,
    ) -> PartitionDelta {
        let Ok(mut owned) = self.owned.lock() else {
            return PartitionDelta::default();
        };
        let current: BTreeSet<PartitionId> = next(&owned)
            .into_iter()
            .filter(|partition| *partition < self.partition_count)
            .collect();
        let delta = PartitionDelta::between(&owned, &current);
        *owned = current;
        if !delta.is_empty() {
            info!(
                target: "fleet.partition",
                added = delta.added.len(),
                removed = delta.removed.len(),
                "partitions_changed"
            );
            let _ = self.tx.send(delta.clone());
        }
        delta
    }

    /// 全量重同步差量：拥有的分区全部视为新增，其余全部视为移除。
    pub fn resync_delta(&self) -> PartitionDelta {
        let owned = self.owned();
        let removed = (0..self.partition_count)
            .filter(|partition| !owned.contains(partition))
            .collect();
        PartitionDelta::new(owned, removed)
    }

    /// 注册监听者：订阅后台推送，直到取消。
    ///
    /// 注册时先投递一次全量重同步；若接收端落后导致丢失变更，也以全量重同步补齐。
    pub fn register(
        self: &Arc<Self>,
        listener: Arc<dyn PartitionListener>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let initial = self.resync_delta();
        let membership = Arc::clone(self);
        tokio::spawn(async move {
            if !initial.added.is_empty() {
                listener.on_partitions_changed(initial).await;
            }
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(target: "fleet.partition", "partition_listener_stopped");
                        break;
                    }
                    received = rx.recv() => received,
                };
                match received {
                    Ok(delta) => listener.on_partitions_changed(delta).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "fleet.partition", skipped, "partition_listener_lagged");
                        listener
                            .on_partitions_changed(membership.resync_delta())
                            .await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingListener {
        deltas: AsyncMutex<Vec<PartitionDelta>>,
    }

    #[async_trait]
    impl PartitionListener for RecordingListener {
        async fn on_partitions_changed(&self, delta: PartitionDelta) {
            self.deltas.lock().await.push(delta);
        }
    }

    #[test]
    fn assign_reports_added_and_removed() {
        let membership = PartitionMembership::new(8);
        let first = membership.assign([0, 1, 2]);
        assert_eq!(first.added, [0, 1, 2].into_iter().collect());
        let second = membership.assign([2, 3, 99]);
        assert_eq!(second.added, [3].into_iter().collect());
        assert_eq!(second.removed, [0, 1].into_iter().collect());
        assert_eq!(membership.owned(), [2, 3].into_iter().collect());
    }

    #[test]
    fn unchanged_assignment_is_empty() {
        let membership = PartitionMembership::new(4);
        membership.grant([1]);
        assert!(membership.grant([1]).is_empty());
        assert_eq!(membership.revoke([1]).removed, [1].into_iter().collect());
    }

    #[test]
    fn concurrent_grants_are_all_kept() {
        let membership = Arc::new(PartitionMembership::new(64));
        let workers: Vec<_> = (0..8u32)
            .map(|worker| {
                let membership = Arc::clone(&membership);
                std::thread::spawn(move || {
                    let mut added = Vec::new();
                    for partition in (worker * 8)..(worker * 8 + 8) {
                        added.extend(membership.grant([partition]).added);
                    }
                    added
                })
            })
            .collect();
        let mut added = Vec::new();
        for worker in workers {
            added.extend(worker.join().unwrap());
        }

        assert_eq!(membership.owned(), (0..64).collect());
        // 每个分区恰好出现在一个差量中
        added.sort_unstable();
        assert_eq!(added, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_grant_and_revoke_do_not_lose_updates() {
        let membership = Arc::new(PartitionMembership::new(64));
        membership.assign(0..32);
        let granting = {
            let membership = Arc::clone(&membership);
            std::thread::spawn(move || {
                for partition in 32..64 {
                    membership.grant([partition]);
                }
            })
        };
        let revoking = {
            let membership = Arc::clone(&membership);
            std::thread::spawn(move || {
                for partition in 0..32 {
                    membership.revoke([partition]);
                }
            })
        };
        granting.join().unwrap();
        revoking.join().unwrap();

        assert_eq!(membership.owned(), (32..64).collect());
    }

    #[test]
    fn resync_covers_whole_partition_space() {
        let membership = PartitionMembership::new(4);
        membership.assign([1, 2]);
        let delta = membership.resync_delta();
        assert_eq!(delta.added, [1, 2].into_iter().collect());
        assert_eq!(delta.removed, [0, 3].into_iter().collect());
    }

    #[tokio::test]
    async fn registered_listener_receives_deltas_in_order() {
        let membership = Arc::new(PartitionMembership::new(8));
        let listener = Arc::new(RecordingListener::default());
        let cancel = CancellationToken::new();
        let handle = membership.register(listener.clone(), cancel.clone());

        membership.assign([0, 1]);
        membership.revoke([0]);

        for _ in 0..50 {
            if listener.deltas.lock().await.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.expect("listener task");

        let deltas = listener.deltas.lock().await;
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].added, [0, 1].into_iter().collect());
        assert_eq!(deltas[1].removed, [0].into_iter().collect());
    }
}
