//! Postgres 在线状态存储实现
//!
//! 依赖表：
//!
//! ```sql
//! create table hubs (
//!     hub_id         text primary key,
//!     place_id       text null,
//!     partition_id   integer not null,
//!     state          text not null,
//!     last_change_ms bigint null
//! );
//! create index idx_hubs_partition on hubs (partition_id, hub_id);
//! ```
//!
//! 设计要点：
//! - 上线/离线使用带条件的 `update ... returning`，只有真正迁移的那一次返回行
//! - 按分区加载使用 `hub_id` 游标分页，避免一次性拉取整个分区

use crate::error::StorageError;
use crate::liveness::{HubStream, LivenessStore, now_epoch_ms};
use domain::{ChangedAttributes, HubRecord, HubState, PartitionId};
use futures::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// 分区加载每页行数。
const PARTITION_PAGE_SIZE: i64 = 500;

pub struct PgLivenessStore {
    pub pool: PgPool,
}

impl PgLivenessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }

    async fn transition(
        &self,
        hub_id: &str,
        from: HubState,
        to: HubState,
    ) -> Result<ChangedAttributes, StorageError> {
        let ts_ms = now_epoch_ms();
        let row = sqlx::query(
            "update hubs set state = $1, last_change_ms = $2 \
             where hub_id = $3 and state = $4 returning hub_id",
        )
        .bind(to.as_str())
        .bind(ts_ms)
        .bind(hub_id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;
        if row.is_some() {
            debug!(
                target: "fleet.storage",
                hub_id = %hub_id,
                state = to.as_str(),
                "hub_state_changed"
            );
            return Ok(match to {
                HubState::Online => ChangedAttributes::connected(ts_ms),
                _ => ChangedAttributes::disconnected(ts_ms),
            });
        }
        let exists = sqlx::query("select 1 from hubs where hub_id = $1")
            .bind(hub_id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(ChangedAttributes::empty()),
            None => Err(StorageError::NotFound(hub_id.to_string())),
        }
    }
}

fn hub_from_row(row: &PgRow) -> Result<HubRecord, StorageError> {
    let state: String = row.try_get("state")?;
    let state = HubState::parse(&state).ok_or_else(|| StorageError::Decode(state.clone()))?;
    let partition_id: i32 = row.try_get("partition_id")?;
    let partition_id = PartitionId::try_from(partition_id)
        .map_err(|_| StorageError::Decode(format!("partition_id {}", partition_id)))?;
    Ok(HubRecord {
        hub_id: row.try_get("hub_id")?,
        place_id: row.try_get("place_id")?,
        partition_id,
        state,
    })
}

/// 分区分页游标。
struct PartitionCursor {
    pool: PgPool,
    partition_id: PartitionId,
    after: String,
    buffer: VecDeque<HubRecord>,
    done: bool,
}

impl PartitionCursor {
    async fn fetch_page(&mut self) -> Result<(), StorageError> {
        let rows = sqlx::query(
            "select hub_id, place_id, partition_id, state from hubs \
             where partition_id = $1 and hub_id > $2 \
             order by hub_id limit $3",
        )
        .bind(self.partition_id as i32)
        .bind(&self.after)
        .bind(PARTITION_PAGE_SIZE)
        .fetch_all(&self.pool)
        .await?;
        if (rows.len() as i64) < PARTITION_PAGE_SIZE {
            self.done = true;
        }
        for row in rows {
            let hub = hub_from_row(&row)?;
            self.after = hub.hub_id.clone();
            self.buffer.push_back(hub);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LivenessStore for PgLivenessStore {
    async fn find_by_id(&self, hub_id: &str) -> Result<Option<HubRecord>, StorageError> {
        let row = sqlx::query(
            "select hub_id, place_id, partition_id, state from hubs where hub_id = $1",
        )
        .bind(hub_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(hub_from_row(&row)?))
    }

    async fn mark_connected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.transition(hub_id, HubState::Offline, HubState::Online)
            .await
    }

    async fn mark_disconnected(&self, hub_id: &str) -> Result<ChangedAttributes, StorageError> {
        self.transition(hub_id, HubState::Online, HubState::Offline)
            .await
    }

    fn stream_by_partition(&self, partition_id: PartitionId) -> HubStream {
        let cursor = PartitionCursor {
            pool: self.pool.clone(),
            partition_id,
            after: String::new(),
            buffer: VecDeque::new(),
            done: false,
        };
        futures::stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(hub) = cursor.buffer.pop_front() {
                    return Some((Ok(hub), cursor));
                }
                if cursor.done {
                    return None;
                }
                if let Err(err) = cursor.fetch_page().await {
                    warn!(
                        target: "fleet.storage",
                        partition_id = cursor.partition_id,
                        error = %err,
                        "partition_page_failed"
                    );
                    cursor.done = true;
                    cursor.buffer.clear();
                    return Some((Err(err), cursor));
                }
            }
        })
        .boxed()
    }
}
