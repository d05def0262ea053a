use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    Domain,
    User,
    Time,
    Hash,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    Active,
    Rebalancing,
    Readonly,
    Draining,
    Offline,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PartitionStats {
    pub capsule_count: u64,
    pub edge_count: u64,
    /// Percentage, 0-100.
    pub utilization: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub partition_id: String,
    pub strategy: PartitionStrategy,
    pub domain_tags: BTreeSet<String>,
    pub user_ids: BTreeSet<String>,
    /// Subrange of `[0, 100)`; only meaningful for hash/hybrid strategies.
    pub hash_range: Option<Range<u8>>,
    pub state: PartitionState,
    pub stats: PartitionStats,
    pub max_capsules: u64,
}

impl Partition {
    pub fn is_full(&self) -> bool {
        self.state != PartitionState::Rebalancing && self.stats.capsule_count >= self.max_capsules
    }

    pub fn is_assignable(&self) -> bool {
        self.state == PartitionState::Active && !self.is_full()
    }
}
