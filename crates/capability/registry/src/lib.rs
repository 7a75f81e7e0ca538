//! Hub 在线注册表。
//!
//! - `registry`：心跳/断开信号处理与在线查询
//! - `sweeper`：超时扫描
//! - `reconciler`：分区归属变更对账
//! - `service`：后台任务生命周期

pub mod clock;
pub mod error;
pub mod heartbeat;
pub mod reconciler;
pub mod registry;
pub mod service;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::RegistryError;
pub use heartbeat::{HeartbeatRecord, PARTITION_LOAD_SOURCE};
pub use reconciler::{PartitionReconciler, ReconcileReport};
pub use registry::{AbsenceOutcome, LivenessRegistry};
pub use service::HubRegistryService;
pub use sweeper::TimeoutSweeper;
