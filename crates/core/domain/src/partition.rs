//! 分区与分区归属变更。

use std::collections::BTreeSet;

/// 集群分片编号。
pub type PartitionId = u32;

/// 一次分区归属变更：新增与移除集合互不相交。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionDelta {
    pub added: BTreeSet<PartitionId>,
    pub removed: BTreeSet<PartitionId>,
}

impl PartitionDelta {
    /// 构造变更；同时出现在两侧的分区视为无变化，从两侧剔除。
    pub fn new(added: BTreeSet<PartitionId>, removed: BTreeSet<PartitionId>) -> Self {
        let overlap: BTreeSet<PartitionId> = added.intersection(&removed).copied().collect();
        Self {
            added: added.difference(&overlap).copied().collect(),
            removed: removed.difference(&overlap).copied().collect(),
        }
    }

    pub fn added(partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        Self::new(partitions.into_iter().collect(), BTreeSet::new())
    }

    pub fn removed(partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        Self::new(BTreeSet::new(), partitions.into_iter().collect())
    }

    /// 由前后两次归属集合计算变更。
    pub fn between(previous: &BTreeSet<PartitionId>, current: &BTreeSet<PartitionId>) -> Self {
        Self {
            added: current.difference(previous).copied().collect(),
            removed: previous.difference(current).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
