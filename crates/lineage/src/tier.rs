//! HOT/WARM/COLD tiered lineage entry storage with trust/age-driven
//! migration (spec §4.11).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::LineageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEntry {
    pub entry_id: String,
    pub capsule_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub relationship_type: String,
    pub created_at: DateTime<Utc>,
    pub trust_level: u8,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub tier: StorageTier,
    pub compressed: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl LineageEntry {
    pub fn new(
        entry_id: String,
        capsule_id: Uuid,
        parent_id: Option<Uuid>,
        relationship_type: String,
        trust_level: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            entry_id,
            capsule_id,
            parent_id,
            relationship_type,
            created_at: now,
            trust_level,
            metadata: BTreeMap::new(),
            tier: StorageTier::Hot,
            compressed: false,
            archived_at: None,
            last_accessed: now,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierConfig {
    pub tier1_min_trust: u8,
    pub tier2_min_trust: u8,
    pub tier1_max_age_days: i64,
    pub tier2_max_age_days: i64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self { tier1_min_trust: 70, tier2_min_trust: 40, tier1_max_age_days: 30, tier2_max_age_days: 180 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TierStats {
    pub entry_count: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub hot_to_warm: usize,
    pub warm_to_cold: usize,
}

/// Three tiers with distinct backing: HOT entries live in memory in full,
/// WARM entries are gzip-compressed in memory, COLD entries are tracked
/// only by their remote-object-storage key — retrieval from COLD is a
/// stub here, same as the original's unimplemented S3 round-trip.
pub struct TieredLineageStorage {
    hot: parking_lot::RwLock<HashMap<String, LineageEntry>>,
    warm: parking_lot::RwLock<HashMap<String, Vec<u8>>>,
    cold: parking_lot::RwLock<HashMap<String, String>>,
    config: TierConfig,
    stats: parking_lot::RwLock<HashMap<StorageTier, TierStats>>,
}

impl TieredLineageStorage {
    pub fn new(config: TierConfig) -> Self {
        let mut stats = HashMap::new();
        stats.insert(StorageTier::Hot, TierStats::default());
        stats.insert(StorageTier::Warm, TierStats::default());
        stats.insert(StorageTier::Cold, TierStats::default());
        Self {
            hot: parking_lot::RwLock::new(HashMap::new()),
            warm: parking_lot::RwLock::new(HashMap::new()),
            cold: parking_lot::RwLock::new(HashMap::new()),
            config,
            stats: parking_lot::RwLock::new(stats),
        }
    }

    fn determine_initial_tier(&self, trust_level: u8) -> StorageTier {
        if trust_level >= self.config.tier1_min_trust {
            StorageTier::Hot
        } else if trust_level >= self.config.tier2_min_trust {
            StorageTier::Warm
        } else {
            StorageTier::Cold
        }
    }

    pub fn store(&self, mut entry: LineageEntry) -> LineageEntry {
        let tier = self.determine_initial_tier(entry.trust_level);
        entry.tier = tier;

        match tier {
            StorageTier::Hot => {
                self.hot.write().insert(entry.entry_id.clone(), entry.clone());
            }
            StorageTier::Warm => {
                entry.compressed = true;
                self.warm.write().insert(entry.entry_id.clone(), self.compress_entry(&entry));
            }
            StorageTier::Cold => {
                entry.archived_at = Some(Utc::now());
                self.cold.write().insert(entry.entry_id.clone(), self.archive_key(&entry));
            }
        }

        self.update_stats(tier, &entry);
        tracing::debug!(entry_id = %entry.entry_id, tier = ?tier, "lineage_entry_stored");
        entry
    }

    pub fn get(&self, entry_id: &str) -> Option<LineageEntry> {
        if let Some(entry) = self.hot.write().get_mut(entry_id) {
            entry.last_accessed = Utc::now();
            return Some(entry.clone());
        }

        if let Some(compressed) = self.warm.read().get(entry_id) {
            let mut entry = self.decompress_entry(compressed);
            entry.last_accessed = Utc::now();
            return Some(entry);
        }

        if let Some(key) = self.cold.read().get(entry_id) {
            tracing::debug!(s3_key = %key, "lineage_cold_retrieval");
            return None;
        }

        None
    }

    pub fn get_lineage_chain(&self, capsule_id: Uuid, depth: usize) -> Vec<LineageEntry> {
        let mut chain = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut current_id = Some(capsule_id);

        for _ in 0..depth {
            let Some(id) = current_id else { break };
            if !visited.insert(id) {
                break;
            }
            let Some(entry) = self.find_entry_by_capsule(id) else { break };
            current_id = entry.parent_id;
            chain.push(entry);
        }
        chain
    }

    fn find_entry_by_capsule(&self, capsule_id: Uuid) -> Option<LineageEntry> {
        if let Some(entry) = self.hot.read().values().find(|e| e.capsule_id == capsule_id) {
            return Some(entry.clone());
        }
        self.warm
            .read()
            .values()
            .map(|data| self.decompress_entry(data))
            .find(|e| e.capsule_id == capsule_id)
    }

    pub fn migrate_to_tier(&self, entry_id: &str, target_tier: StorageTier) -> Result<(), LineageError> {
        let mut entry = self.get(entry_id).ok_or_else(|| LineageError::NotFound(entry_id.to_string()))?;
        let current_tier = entry.tier;
        if current_tier == target_tier {
            return Ok(());
        }

        match current_tier {
            StorageTier::Hot => {
                self.hot.write().remove(entry_id);
            }
            StorageTier::Warm => {
                self.warm.write().remove(entry_id);
            }
            StorageTier::Cold => {
                self.cold.write().remove(entry_id);
            }
        }

        entry.tier = target_tier;
        match target_tier {
            StorageTier::Hot => {
                entry.compressed = false;
                self.hot.write().insert(entry_id.to_string(), entry.clone());
            }
            StorageTier::Warm => {
                entry.compressed = true;
                self.warm.write().insert(entry_id.to_string(), self.compress_entry(&entry));
            }
            StorageTier::Cold => {
                entry.archived_at = Some(Utc::now());
                self.cold.write().insert(entry_id.to_string(), self.archive_key(&entry));
            }
        }

        tracing::info!(entry_id, from = ?current_tier, to = ?target_tier, "lineage_entry_migrated");
        Ok(())
    }

    /// Moves HOT entries past `tier1_max_age_days` or below
    /// `tier1_min_trust` into WARM, and WARM entries past
    /// `tier2_max_age_days` or below `tier2_min_trust` into COLD.
    pub fn perform_tier_migration(&self) -> MigrationReport {
        let now = Utc::now();
        let tier1_cutoff = now - Duration::days(self.config.tier1_max_age_days);
        let tier2_cutoff = now - Duration::days(self.config.tier2_max_age_days);

        let hot_candidates: Vec<String> = self
            .hot
            .read()
            .values()
            .filter(|e| e.created_at < tier1_cutoff || e.trust_level < self.config.tier1_min_trust)
            .map(|e| e.entry_id.clone())
            .collect();
        for entry_id in &hot_candidates {
            let _ = self.migrate_to_tier(entry_id, StorageTier::Warm);
        }

        let warm_candidates: Vec<String> = self
            .warm
            .read()
            .iter()
            .filter_map(|(id, data)| {
                let entry = self.decompress_entry(data);
                (entry.created_at < tier2_cutoff || entry.trust_level < self.config.tier2_min_trust)
                    .then(|| id.clone())
            })
            .collect();
        for entry_id in &warm_candidates {
            let _ = self.migrate_to_tier(entry_id, StorageTier::Cold);
        }

        let report = MigrationReport { hot_to_warm: hot_candidates.len(), warm_to_cold: warm_candidates.len() };
        if report.hot_to_warm > 0 || report.warm_to_cold > 0 {
            tracing::info!(hot_to_warm = report.hot_to_warm, warm_to_cold = report.warm_to_cold, "tier_migration_completed");
        }
        report
    }

    fn compress_entry(&self, entry: &LineageEntry) -> Vec<u8> {
        crate::compress_bytes(&serde_json::to_vec(entry).unwrap_or_default())
    }

    fn decompress_entry(&self, data: &[u8]) -> LineageEntry {
        let bytes = crate::decompress_bytes(data).unwrap_or_default();
        serde_json::from_slice(&bytes).expect("warm-tier entries are always well-formed")
    }

    fn archive_key(&self, entry: &LineageEntry) -> String {
        format!("lineage/{}/{}/{}.json.gz", entry.created_at.format("%Y"), entry.created_at.format("%m"), entry.entry_id)
    }

    fn update_stats(&self, tier: StorageTier, entry: &LineageEntry) {
        let mut stats = self.stats.write();
        let tier_stats = stats.entry(tier).or_default();
        tier_stats.entry_count += 1;
        if tier_stats.oldest_entry.is_none_or(|oldest| entry.created_at < oldest) {
            tier_stats.oldest_entry = Some(entry.created_at);
        }
        if tier_stats.newest_entry.is_none_or(|newest| entry.created_at > newest) {
            tier_stats.newest_entry = Some(entry.created_at);
        }
    }

    pub fn tier_stats(&self) -> HashMap<StorageTier, TierStats> {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(trust: u8) -> LineageEntry {
        LineageEntry::new(uuid::Uuid::new_v4().to_string(), Uuid::new_v4(), None, "DERIVED_FROM".to_string(), trust)
    }

    #[test]
    fn high_trust_entries_land_in_hot() {
        let storage = TieredLineageStorage::new(TierConfig::default());
        let stored = storage.store(entry(90));
        assert_eq!(stored.tier, StorageTier::Hot);
        assert!(storage.get(&stored.entry_id).is_some());
    }

    #[test]
    fn mid_trust_entries_land_in_warm_and_round_trip_compressed() {
        let storage = TieredLineageStorage::new(TierConfig::default());
        let stored = storage.store(entry(50));
        assert_eq!(stored.tier, StorageTier::Warm);
        let fetched = storage.get(&stored.entry_id).unwrap();
        assert_eq!(fetched.trust_level, 50);
    }

    #[test]
    fn low_trust_entries_land_in_cold_and_are_not_retrievable() {
        let storage = TieredLineageStorage::new(TierConfig::default());
        let stored = storage.store(entry(10));
        assert_eq!(stored.tier, StorageTier::Cold);
        assert!(storage.get(&stored.entry_id).is_none());
    }

    #[test]
    fn migrate_to_tier_moves_an_entry_between_backing_stores() {
        let storage = TieredLineageStorage::new(TierConfig::default());
        let stored = storage.store(entry(90));
        storage.migrate_to_tier(&stored.entry_id, StorageTier::Warm).unwrap();
        let fetched = storage.get(&stored.entry_id).unwrap();
        assert_eq!(fetched.tier, StorageTier::Warm);
        assert!(fetched.compressed);
    }

    #[test]
    fn perform_tier_migration_demotes_low_trust_hot_entries() {
        let mut config = TierConfig::default();
        config.tier1_min_trust = 80;
        let storage = TieredLineageStorage::new(config);

        let mut low_trust = entry(60);
        low_trust.trust_level = 60;
        let mut stored = storage.store(low_trust);
        stored.tier = StorageTier::Hot;
        // force into hot directly to exercise the migration path regardless
        // of determine_initial_tier's own routing
        storage.hot.write().insert(stored.entry_id.clone(), stored.clone());
        storage.warm.write().remove(&stored.entry_id);

        let report = storage.perform_tier_migration();
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(storage.get(&stored.entry_id).unwrap().tier, StorageTier::Warm);
    }

    #[test]
    fn get_lineage_chain_walks_parent_links_until_the_root() {
        let storage = TieredLineageStorage::new(TierConfig::default());
        let root_capsule = Uuid::new_v4();
        let child_capsule = Uuid::new_v4();

        let root = LineageEntry::new("root".to_string(), root_capsule, None, "ROOT".to_string(), 90);
        let child = LineageEntry::new("child".to_string(), child_capsule, Some(root_capsule), "DERIVED_FROM".to_string(), 90);
        storage.store(root);
        storage.store(child);

        let chain = storage.get_lineage_chain(child_capsule, 10);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].capsule_id, child_capsule);
        assert_eq!(chain[1].capsule_id, root_capsule);
    }
}
