//! Partition Manager (C8): domain-based partition assignment and periodic
//! rebalancing (spec §4.8).

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forge_primitives::{Partition, PartitionError, PartitionState, PartitionStrategy};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Bounded history of rebalance jobs retained for observability; the
/// manager itself never consults old jobs once they finish.
const MAX_TRACKED_JOBS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RebalanceJob {
    pub job_id: String,
    pub source_partition: String,
    pub target_partition: String,
    pub moved_count: u64,
    pub status: RebalanceJobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Affinity scoring input for a capsule being assigned (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct AssignmentHint {
    pub domain_tags: BTreeSet<String>,
    pub owner_id: Option<String>,
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Hashes a capsule id into `[0, 100)` using SHA-256 exclusively, per the
/// decision to never fall back to a weaker hash for partition assignment.
fn hash_bucket(capsule_id: Uuid) -> u8 {
    let digest = Sha256::digest(capsule_id.as_bytes());
    (u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 100) as u8
}

pub struct PartitionManager {
    partitions: DashMap<String, Partition>,
    capsule_partition_map: DashMap<Uuid, String>,
    rebalance_jobs: RwLock<VecDeque<RebalanceJob>>,
    default_max_capsules: u64,
    rebalance_threshold: f32,
}

impl PartitionManager {
    pub fn new(default_max_capsules: u64, rebalance_threshold: f32) -> Self {
        let manager = Self {
            partitions: DashMap::new(),
            capsule_partition_map: DashMap::new(),
            rebalance_jobs: RwLock::new(VecDeque::new()),
            default_max_capsules,
            rebalance_threshold,
        };
        manager.partitions.insert(
            "default".to_string(),
            Partition {
                partition_id: "default".to_string(),
                strategy: PartitionStrategy::Hash,
                domain_tags: BTreeSet::new(),
                user_ids: BTreeSet::new(),
                hash_range: Some(0..100),
                state: PartitionState::Active,
                stats: Default::default(),
                max_capsules: default_max_capsules,
            },
        );
        manager
    }

    pub fn create_partition(
        &self,
        name: String,
        strategy: PartitionStrategy,
        domain_tags: BTreeSet<String>,
        hash_range: Option<std::ops::Range<u8>>,
    ) -> Partition {
        let partition_id = format!("p_{}", &sha256_hex(&name)[..16]);
        let partition = Partition {
            partition_id: partition_id.clone(),
            strategy,
            domain_tags,
            user_ids: BTreeSet::new(),
            hash_range,
            state: PartitionState::Active,
            stats: Default::default(),
            max_capsules: self.default_max_capsules,
        };
        self.partitions.insert(partition_id, partition.clone());
        tracing::info!(partition_id = %partition.partition_id, %name, "partition_created");
        partition
    }

    pub fn get_partition(&self, partition_id: &str) -> Option<Partition> {
        self.partitions.get(partition_id).map(|p| p.clone())
    }

    pub fn list_partitions(&self) -> Vec<Partition> {
        self.partitions.iter().map(|p| p.value().clone()).collect()
    }

    pub fn get_capsule_partition(&self, capsule_id: Uuid) -> Option<String> {
        self.capsule_partition_map.get(&capsule_id).map(|p| p.clone())
    }

    /// Assigns `capsule_id` to the highest-scoring active, non-full
    /// partition; synthesizes a fresh hash-strategy partition if none
    /// scores (spec §4.8).
    pub fn assign_capsule(&self, capsule_id: Uuid, hint: &AssignmentHint) -> String {
        let mut best: Option<(String, f32)> = None;
        for entry in self.partitions.iter() {
            let partition = entry.value();
            if !partition.is_assignable() {
                continue;
            }
            let score = self.score(partition, capsule_id, hint);
            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((partition.partition_id.clone(), score));
            }
        }

        let partition_id = match best {
            Some((id, _)) => id,
            None => {
                let name = format!("auto-{}", Uuid::new_v4());
                self.create_partition(name, PartitionStrategy::Hash, BTreeSet::new(), Some(0..100))
                    .partition_id
            }
        };

        self.capsule_partition_map.insert(capsule_id, partition_id.clone());
        if let Some(mut partition) = self.partitions.get_mut(&partition_id) {
            partition.stats.capsule_count += 1;
            partition.stats.utilization =
                (partition.stats.capsule_count as f32 / partition.max_capsules.max(1) as f32) * 100.0;
        }
        tracing::debug!(%capsule_id, %partition_id, "capsule_assigned");
        partition_id
    }

    fn score(&self, partition: &Partition, capsule_id: Uuid, hint: &AssignmentHint) -> f32 {
        let mut score = 0.0;

        let overlap = hint.domain_tags.intersection(&partition.domain_tags).count();
        score += overlap as f32 * 10.0;

        if let Some(owner) = &hint.owner_id {
            if partition.user_ids.contains(owner) {
                score += 20.0;
            }
        }

        if partition.strategy == PartitionStrategy::Hash {
            if let Some(range) = &partition.hash_range {
                let bucket = hash_bucket(capsule_id);
                if range.contains(&bucket) {
                    score += 15.0;
                }
            }
        }

        score += (100.0 - partition.stats.utilization) / 10.0;
        score
    }

    /// Checks imbalance across partitions and starts a rebalance job if it
    /// exceeds the configured threshold.
    pub fn trigger_rebalance(&self) -> Option<RebalanceJob> {
        let partitions = self.list_partitions();
        if partitions.is_empty() {
            return None;
        }

        let max_util = partitions
            .iter()
            .map(|p| p.stats.utilization)
            .fold(f32::MIN, f32::max);
        let min_util = partitions
            .iter()
            .map(|p| p.stats.utilization)
            .fold(f32::MAX, f32::min);
        let imbalance = (max_util - min_util) / 100.0;
        if imbalance < self.rebalance_threshold {
            return None;
        }

        let mut sorted = partitions;
        sorted.sort_by(|a, b| b.stats.utilization.partial_cmp(&a.stats.utilization).unwrap());
        let source = sorted.first()?.partition_id.clone();
        let target = sorted.last()?.partition_id.clone();
        if source == target {
            return None;
        }

        let job = RebalanceJob {
            job_id: format!("rebal_{}", Uuid::new_v4()),
            source_partition: source,
            target_partition: target,
            moved_count: 0,
            status: RebalanceJobStatus::Pending,
            started_at: None,
            completed_at: None,
        };
        self.track_job(job.clone());
        tracing::info!(job_id = %job.job_id, source = %job.source_partition, target = %job.target_partition, imbalance, "rebalance_triggered");
        Some(job)
    }

    /// Moves ~10% of the source partition's capsules to the target,
    /// atomically with respect to the mapping table. Never panics: any
    /// internal failure marks the job `Failed` rather than propagating,
    /// so a caller running this as a background task can't bring the
    /// manager down.
    pub fn execute_rebalance(&self, job_id: &str) -> Result<(), PartitionError> {
        let (source_id, target_id) = {
            let jobs = self.rebalance_jobs.read();
            let job = jobs
                .iter()
                .find(|j| j.job_id == job_id)
                .ok_or_else(|| PartitionError::NotFound(job_id.to_string()))?;
            (job.source_partition.clone(), job.target_partition.clone())
        };

        self.set_job_status(job_id, RebalanceJobStatus::Running, Some(Utc::now()), None);

        let result = self.move_capsules(&source_id, &target_id, job_id);
        match result {
            Ok(moved) => {
                self.set_job_status(job_id, RebalanceJobStatus::Completed, None, Some(Utc::now()));
                self.update_job_moved_count(job_id, moved);
                tracing::info!(%job_id, moved, "rebalance_completed");
                Ok(())
            }
            Err(e) => {
                self.set_job_status(job_id, RebalanceJobStatus::Failed, None, Some(Utc::now()));
                tracing::error!(%job_id, error = %e, "rebalance_failed");
                Err(e)
            }
        }
    }

    fn move_capsules(&self, source_id: &str, target_id: &str, job_id: &str) -> Result<u64, PartitionError> {
        if let Some(mut p) = self.partitions.get_mut(source_id) {
            p.state = PartitionState::Rebalancing;
        } else {
            return Err(PartitionError::NotFound(source_id.to_string()));
        }
        if let Some(mut p) = self.partitions.get_mut(target_id) {
            p.state = PartitionState::Rebalancing;
        } else {
            self.restore_state(source_id);
            return Err(PartitionError::NotFound(target_id.to_string()));
        }

        let source_count = self
            .partitions
            .get(source_id)
            .map(|p| p.stats.capsule_count)
            .unwrap_or(0);
        let to_move = (source_count as f64 * 0.1) as u64;

        let mut moved = 0u64;
        let candidates: Vec<Uuid> = self
            .capsule_partition_map
            .iter()
            .filter(|e| e.value() == source_id)
            .map(|e| *e.key())
            .take(to_move as usize)
            .collect();

        for capsule_id in candidates {
            self.capsule_partition_map.insert(capsule_id, target_id.to_string());
            moved += 1;
        }

        if let Some(mut p) = self.partitions.get_mut(source_id) {
            p.stats.capsule_count = p.stats.capsule_count.saturating_sub(moved);
            p.stats.utilization = (p.stats.capsule_count as f32 / p.max_capsules.max(1) as f32) * 100.0;
        }
        if let Some(mut p) = self.partitions.get_mut(target_id) {
            p.stats.capsule_count += moved;
            p.stats.utilization = (p.stats.capsule_count as f32 / p.max_capsules.max(1) as f32) * 100.0;
        }

        self.restore_state(source_id);
        self.restore_state(target_id);
        tracing::debug!(%job_id, moved, "rebalance_moved_capsules");
        Ok(moved)
    }

    fn restore_state(&self, partition_id: &str) {
        if let Some(mut p) = self.partitions.get_mut(partition_id) {
            p.state = PartitionState::Active;
        }
    }

    fn track_job(&self, job: RebalanceJob) {
        let mut jobs = self.rebalance_jobs.write();
        jobs.push_back(job);
        while jobs.len() > MAX_TRACKED_JOBS {
            jobs.pop_front();
        }
    }

    fn set_job_status(
        &self,
        job_id: &str,
        status: RebalanceJobStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) {
        let mut jobs = self.rebalance_jobs.write();
        if let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.status = status;
            if started_at.is_some() {
                job.started_at = started_at;
            }
            if completed_at.is_some() {
                job.completed_at = completed_at;
            }
        }
    }

    fn update_job_moved_count(&self, job_id: &str, moved: u64) {
        let mut jobs = self.rebalance_jobs.write();
        if let Some(job) = jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.moved_count = moved;
        }
    }

    pub fn rebalance_jobs(&self) -> Vec<RebalanceJob> {
        self.rebalance_jobs.read().iter().cloned().collect()
    }
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new(50_000, 0.2)
    }
}
