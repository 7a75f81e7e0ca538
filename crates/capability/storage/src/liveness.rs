//! 在线状态存储接口。
//!
//! 存储是 Hub 连接状态的唯一持久真相；`mark_connected` / `mark_disconnected`
//! 幂等，仅在状态真正迁移时返回非空的变更属性，注册表据此决定是否对外广播。

use crate::error::StorageError;
use domain::{ChangedAttributes, HubRecord, PartitionId};
use futures::stream::BoxStream;

/// 按分区流式返回的 Hub 记录。
pub type HubStream = BoxStream<'static, Result<HubRecord, StorageError>>;

#[async_trait::async_trait]
pub trait LivenessStore: Send + Sync {
    /// 查找 Hub 记录。
    async fn find_by_id(&self, hub_id: &str) -> Result<Option<HubRecord>, StorageError>;

    /// 标记上线；已在线或处于 DOWN 终态时返回空集合。
    async fn mark_connected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError>;

    /// 标记离线；已离线或处于 DOWN 终态时返回空集合。
    async fn mark_disconnected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError>;

    /// 流式读取某分区下的全部 Hub；每次调用都从头开始。
    fn stream_by_partition(&self, partition_id: PartitionId) -> HubStream;
}

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
