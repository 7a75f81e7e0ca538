use fleet_events::EventError;
use fleet_storage::StorageError;

/// 对账失败（只记录日志，不向信号来源传播）。
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("event error: {0}")]
    Event(#[from] EventError),
}

impl RegistryError {
    /// 存储中不存在该 Hub（跟踪不一致，不重试）。
    pub fn is_unknown_hub(&self) -> bool {
        matches!(self, RegistryError::Storage(err) if err.is_not_found())
    }
}
