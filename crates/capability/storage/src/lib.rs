//! # Fleet Storage 模块
//!
//! Hub 在线状态的持久化抽象层。
//!
//! ## 模块说明
//!
//! - [`liveness`]：`LivenessStore` 接口（查找、幂等上线/离线迁移、按分区流式加载）
//! - [`error`]：存储错误类型（不可用 / 不存在 / 解码失败）
//! - [`connection`]：PostgreSQL 连接池管理
//! - [`in_memory`]：`RwLock<HashMap>` 内存实现，用于测试和本地演示
//! - [`postgres`]：sqlx 实现，生产环境使用
//!
//! ## 迁移语义
//!
//! | 持久化状态 | mark_connected | mark_disconnected |
//! |---|---|---|
//! | OFFLINE | → ONLINE，返回变更 | 空 |
//! | ONLINE | 空 | → OFFLINE，返回变更 |
//! | DOWN | 空（终态） | 空（终态） |
//! | 不存在 | NotFound | NotFound |

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod liveness;
pub mod postgres;

pub use connection::*;
pub use error::*;
pub use liveness::{HubStream, LivenessStore};

pub use in_memory::InMemoryLivenessStore;
pub use postgres::PgLivenessStore;
