/// 上游接入层交付的 Hub 信号。
///
/// 分区与来源由上游判定，注册表按原样信任。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubSignal {
    /// 来自某个接入来源的心跳/连接。
    Heartbeat {
        hub_id: String,
        partition_id: crate::PartitionId,
        source_id: String,
    },
    /// 某个接入来源报告连接断开。
    Absence { hub_id: String, source_id: String },
}

impl HubSignal {
    pub fn hub_id(&self) -> &str {
        match self {
            HubSignal::Heartbeat { hub_id, .. } => hub_id,
            HubSignal::Absence { hub_id, .. } => hub_id,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            HubSignal::Heartbeat { source_id, .. } => source_id,
            HubSignal::Absence { source_id, .. } => source_id,
        }
    }
}
