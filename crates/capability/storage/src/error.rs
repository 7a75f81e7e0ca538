//! 存储层错误类型
//!
//! 区分两类对调用方有意义的失败：
//! - 存储不可用（连接、SQL 执行错误），可在下次信号/扫描时重试
//! - Hub 不存在（跟踪与存储不一致），不重试

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("hub not found: {0}")]
    NotFound(String),
    #[error("invalid stored value: {0}")]
    Decode(String),
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
