//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用的 `LivenessStore` 实现。
//!
//! ## 设计原则
//!
//! 1. **参数化查询**：所有 SQL 使用参数绑定（`$1`, `$2` 等）
//! 2. **条件迁移**：上线/离线是带前置状态条件的单条 `update`，并发重复调用只有一次生效
//! 3. **连接池管理**：复用 `connection.rs` 中的连接池（最大连接数 8）
//!
//! ## 错误处理
//!
//! - `sqlx::Error` 自动转换为 `StorageError::Unavailable`
//! - Hub 不存在时迁移操作返回 `StorageError::NotFound`

pub mod liveness;

pub use liveness::*;
