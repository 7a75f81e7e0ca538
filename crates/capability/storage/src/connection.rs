//! 数据库连接管理
//!
//! - connect_pool：建立 Postgres 连接池（最大连接数 8）

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// 建立 Postgres 连接池
///
/// 分区加载时每个分区各占一个连接做分页查询，8 个连接足以覆盖常见并发度。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    info!(target: "fleet.storage", max_connections = 8, "pg_pool_connected");
    Ok(pool)
}
