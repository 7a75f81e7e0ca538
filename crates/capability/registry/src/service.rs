//! 注册表服务生命周期：注册分区监听、启动超时扫描、协作式停止。

use crate::reconciler::PartitionReconciler;
use crate::registry::LivenessRegistry;
use crate::sweeper::TimeoutSweeper;
use fleet_partition::PartitionMembership;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct HubRegistryService {
    registry: Arc<LivenessRegistry>,
    reconciler: Arc<PartitionReconciler>,
    sweeper: Arc<TimeoutSweeper>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HubRegistryService {
    /// 构造 `PartitionReconciler` 时使用的令牌需为 `cancel` 本身或其子令牌。
    pub fn new(
        registry: Arc<LivenessRegistry>,
        reconciler: Arc<PartitionReconciler>,
        sweeper: Arc<TimeoutSweeper>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            reconciler,
            sweeper,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<LivenessRegistry> {
        &self.registry
    }

    pub fn reconciler(&self) -> &Arc<PartitionReconciler> {
        &self.reconciler
    }

    pub fn sweeper(&self) -> &Arc<TimeoutSweeper> {
        &self.sweeper
    }

    /// 注册分区监听并启动超时扫描。
    pub fn start(&self, membership: &Arc<PartitionMembership>) {
        let listener = membership.register(
            Arc::clone(&self.reconciler) as Arc<dyn fleet_partition::PartitionListener>,
            self.cancel.child_token(),
        );
        let sweeper = Arc::clone(&self.sweeper).spawn(self.cancel.child_token());
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(listener);
            tasks.push(sweeper);
        }
        info!(
            target: "fleet.registry",
            sweep_interval_ms = self.sweeper.interval().as_millis() as u64,
            offline_timeout_ms = self.registry.offline_timeout_ms(),
            "hub_registry_started"
        );
    }

    /// 停止扫描与分区加载，等待后台任务退出。
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            if let Err(err) = task.await {
                warn!(target: "fleet.registry", error = %err, "hub_registry_task_failed");
            }
        }
        info!(target: "fleet.registry", tracked = self.registry.count(), "hub_registry_stopped");
    }
}
