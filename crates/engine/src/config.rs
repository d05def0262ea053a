//! `ForgeConfig`: the single configuration value an `Engine` is built from.
//! Loaded from TOML; durations round-trip as milliseconds on disk but are
//! `Duration` in memory, matching the teacher's `SyncConfig` pattern.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use forge_cache::{InvalidationStrategy, QueryCacheConfig};
use forge_lineage::TierConfig;
use forge_semantic::DetectionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Feature toggles (spec §6): which optional subsystems the engine wires in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub enable_caching: bool,
    pub enable_partitioning: bool,
    pub enable_federation: bool,
    pub enable_semantic_detection: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_caching: true,
            enable_partitioning: false,
            enable_federation: false,
            // No-prescribed-provider Non-goal (§1): off until an embedding/LLM
            // provider is actually supplied to `Engine::build`.
            enable_semantic_detection: false,
        }
    }
}

/// Event Bus fan-out bound (spec §4.3); the in-memory `GraphStore` is test
/// scaffolding (§1 Non-goals), so this is the only knob the store owns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub event_bus_max_concurrent_handlers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_bus_max_concurrent_handlers: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_cached_result_bytes: usize,
    #[serde(rename = "default_ttl_ms", with = "serde_duration")]
    pub default_ttl: Duration,
    pub strategy: CacheInvalidationStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let defaults = QueryCacheConfig::default();
        Self {
            max_entries: defaults.max_entries,
            max_cached_result_bytes: defaults.max_cached_result_bytes,
            default_ttl: defaults.default_ttl,
            strategy: CacheInvalidationStrategy::Immediate,
        }
    }
}

impl CacheConfig {
    pub fn into_query_cache_config(self, ttl_by_query_type: HashMap<String, Duration>) -> QueryCacheConfig {
        QueryCacheConfig {
            max_entries: self.max_entries,
            max_cached_result_bytes: self.max_cached_result_bytes,
            default_ttl: self.default_ttl,
            ttl_by_query_type,
            strategy: self.strategy.into(),
        }
    }
}

/// A file-friendly mirror of [`InvalidationStrategy`]; the `Debounced`
/// window is a duration in milliseconds rather than a `Duration` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheInvalidationStrategy {
    Immediate,
    Debounced { window_ms: u64 },
    Lazy,
}

impl From<CacheInvalidationStrategy> for InvalidationStrategy {
    fn from(value: CacheInvalidationStrategy) -> Self {
        match value {
            CacheInvalidationStrategy::Immediate => InvalidationStrategy::Immediate,
            CacheInvalidationStrategy::Debounced { window_ms } => InvalidationStrategy::Debounced {
                window: Duration::from_millis(window_ms),
            },
            CacheInvalidationStrategy::Lazy => InvalidationStrategy::Lazy,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub default_max_capsules: u64,
    pub rebalance_threshold: f32,
    pub executor_max_concurrency: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            default_max_capsules: 100_000,
            rebalance_threshold: 0.2,
            executor_max_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub instance_id: String,
    pub instance_name: String,
    #[serde(rename = "handshake_timeout_ms", with = "serde_duration")]
    pub handshake_timeout: Duration,
    #[serde(rename = "request_timeout_ms", with = "serde_duration")]
    pub request_timeout: Duration,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            instance_name: String::new(),
            handshake_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub tier1_min_trust: u8,
    pub tier2_min_trust: u8,
    pub tier1_max_age_days: i64,
    pub tier2_max_age_days: i64,
    pub max_delta_chain: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        let tiers = TierConfig::default();
        Self {
            tier1_min_trust: tiers.tier1_min_trust,
            tier2_min_trust: tiers.tier2_min_trust,
            tier1_max_age_days: tiers.tier1_max_age_days,
            tier2_max_age_days: tiers.tier2_max_age_days,
            max_delta_chain: 50,
        }
    }
}

impl LineageConfig {
    pub fn into_tier_config(self) -> TierConfig {
        TierConfig {
            tier1_min_trust: self.tier1_min_trust,
            tier2_min_trust: self.tier2_min_trust,
            tier1_max_age_days: self.tier1_max_age_days,
            tier2_max_age_days: self.tier2_max_age_days,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub default_max_hops: u32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self { default_max_hops: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub similarity_threshold: f32,
    pub confidence_threshold: f32,
    pub max_candidates: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        let defaults = DetectionConfig::default();
        Self {
            similarity_threshold: defaults.similarity_threshold,
            confidence_threshold: defaults.confidence_threshold,
            max_candidates: defaults.max_candidates,
        }
    }
}

impl SemanticConfig {
    pub fn into_detection_config(self, enabled: bool) -> DetectionConfig {
        DetectionConfig {
            similarity_threshold: self.similarity_threshold,
            confidence_threshold: self.confidence_threshold,
            max_candidates: self.max_candidates,
            enabled,
            ..DetectionConfig::default()
        }
    }
}

/// Top-level engine configuration; one TOML file per running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub data_dir: Utf8PathBuf,
    pub features: FeatureToggles,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub semantic: SemanticConfig,
    pub partition: PartitionConfig,
    pub federation: FederationConfig,
    pub lineage: LineageConfig,
    pub cascade: CascadeConfig,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            data_dir: Utf8PathBuf::from("."),
            features: FeatureToggles::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            semantic: SemanticConfig::default(),
            partition: PartitionConfig::default(),
            federation: FederationConfig::default(),
            lineage: LineageConfig::default(),
            cascade: CascadeConfig::default(),
        }
    }
}

const CONFIG_FILE_NAME: &str = "forge.toml";

impl ForgeConfig {
    pub fn config_path(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }

    pub fn exists(dir: &Utf8Path) -> bool {
        Self::config_path(dir).exists()
    }

    pub fn load(dir: &Utf8Path) -> Result<Self, ConfigError> {
        let path = Self::config_path(dir);
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, dir: &Utf8Path) -> Result<(), ConfigError> {
        let path = Self::config_path(dir);
        let rendered = toml::to_string_pretty(self)?;
        fs::write(&path, rendered).map_err(|source| ConfigError::Write { path, source })
    }
}

/// Serializes a `Duration` as whole milliseconds; mirrors the teacher's
/// `calimero-config::serde_duration` helper used for `SyncConfig`.
mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = ForgeConfig::default();
        let rendered = toml::to_string_pretty(&config).expect("serializes");
        let parsed: ForgeConfig = toml::from_str(&rendered).expect("parses");
        assert_eq!(parsed.cache.default_ttl, config.cache.default_ttl);
        assert_eq!(parsed.partition.default_max_capsules, config.partition.default_max_capsules);
    }

    #[test]
    fn durations_are_milliseconds_on_disk() {
        let config = ForgeConfig::default();
        let rendered = toml::to_string_pretty(&config).expect("serializes");
        assert!(rendered.contains("default_ttl_ms"));
        assert!(rendered.contains("handshake_timeout_ms"));
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let dir = tempfile_dir();
        fs::write(ForgeConfig::config_path(&dir), "not valid toml {{{").unwrap();
        assert!(ForgeConfig::load(&dir).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile_dir();
        let mut config = ForgeConfig::default();
        config.partition.default_max_capsules = 42;
        config.save(&dir).unwrap();
        let loaded = ForgeConfig::load(&dir).unwrap();
        assert_eq!(loaded.partition.default_max_capsules, 42);
        fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> Utf8PathBuf {
        let dir = Utf8PathBuf::from(format!("{}/forge-engine-test-{}", std::env::temp_dir().to_string_lossy(), uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
