//! Query Cache: fingerprint → artifact, single-flight compute, per-query-type
//! TTL, hit-count-weighted LRU eviction, and pluggable invalidation
//! strategies.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use forge_primitives::{CacheEntry, CacheError};
use serde_json::Value;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::backend::{CacheBackend, InMemoryBackend};
use crate::fingerprint::fingerprint;
use crate::invalidation::InvalidationStrategy;

type ComputeResult = Result<Value, CacheError>;

pub struct QueryCacheConfig {
    pub max_entries: usize,
    pub max_cached_result_bytes: usize,
    pub default_ttl: Duration,
    pub ttl_by_query_type: HashMap<String, Duration>,
    pub strategy: InvalidationStrategy,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        let mut ttl_by_query_type = HashMap::new();
        ttl_by_query_type.insert("lineage".to_string(), Duration::from_secs(3600));
        ttl_by_query_type.insert("search".to_string(), Duration::from_secs(600));
        Self {
            max_entries: 10_000,
            max_cached_result_bytes: 256 * 1024,
            default_ttl: Duration::from_secs(60),
            ttl_by_query_type,
            strategy: InvalidationStrategy::Immediate,
        }
    }
}

pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<OnceCell<ComputeResult>>>,
    stale: DashSet<String>,
    backend: Arc<dyn CacheBackend>,
    config: QueryCacheConfig,
    pending_invalidations: DashSet<Uuid>,
}

impl QueryCache {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            stale: DashSet::new(),
            backend: Arc::new(InMemoryBackend::new()),
            config,
            pending_invalidations: DashSet::new(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = backend;
        self
    }

    fn ttl_for(&self, query_type: &str) -> Duration {
        self.config
            .ttl_by_query_type
            .get(query_type)
            .copied()
            .unwrap_or(self.config.default_ttl)
    }

    /// Look up `fingerprint(query_type, params, user_trust)`; on a miss,
    /// runs `compute` exactly once even under N concurrent callers for the
    /// same fingerprint (single-flight), then caches the result.
    pub async fn get_or_compute<F, Fut>(
        &self,
        query_type: &str,
        params: &Value,
        user_trust: u8,
        related_capsule_ids: BTreeSet<Uuid>,
        compute: F,
    ) -> ComputeResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ComputeResult>,
    {
        let fp = fingerprint(query_type, params, user_trust);
        let now = Utc::now();

        if !self.stale.contains(&fp) {
            if let Some(mut entry) = self.entries.get_mut(&fp) {
                if !entry.is_expired(now) {
                    entry.hit_count += 1;
                    entry.last_accessed = now;
                    return Ok(entry.value.clone());
                }
            }
        }
        self.entries.remove(&fp);
        self.stale.remove(&fp);

        let cell = self
            .in_flight
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell.get_or_init(compute).await.clone();
        self.in_flight.remove(&fp);

        if let Ok(value) = &result {
            self.insert(fp, query_type, value.clone(), related_capsule_ids, now)
                .await;
        }

        result
    }

    async fn insert(
        &self,
        fingerprint: String,
        query_type: &str,
        value: Value,
        related_capsule_ids: BTreeSet<Uuid>,
        now: chrono::DateTime<Utc>,
    ) {
        let bytes = serde_json::to_vec(&value).unwrap_or_default();
        if bytes.len() > self.config.max_cached_result_bytes {
            tracing::warn!(
                %fingerprint,
                bytes = bytes.len(),
                "cache value too large, serving direct without caching"
            );
            return;
        }

        let ttl = self.ttl_for(query_type);
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
            query_type: query_type.to_string(),
            related_capsule_ids,
            hit_count: 0,
            last_accessed: now,
        };

        if let Err(err) = self.backend.set(&fingerprint, bytes, ttl).await {
            tracing::debug!(%fingerprint, %err, "cache backend unavailable, serving from memory only");
        }

        self.entries.insert(fingerprint, entry);
        self.evict_if_full();
    }

    fn evict_if_full(&self) {
        if self.entries.len() <= self.config.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by(|a, b| {
                a.value()
                    .last_accessed
                    .cmp(&b.value().last_accessed)
                    .then(a.value().hit_count.cmp(&b.value().hit_count))
            })
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }

    /// Invalidate every entry whose `related_capsule_ids` contains `id`,
    /// per the configured strategy.
    pub fn invalidate_capsule(&self, id: Uuid) {
        match self.config.strategy {
            InvalidationStrategy::Immediate => self.invalidate_now(id),
            InvalidationStrategy::Debounced { .. } => {
                self.pending_invalidations.insert(id);
            }
            InvalidationStrategy::Lazy => self.mark_stale(id),
        }
    }

    fn invalidate_now(&self, id: Uuid) {
        self.entries.retain(|_, entry| !entry.related_capsule_ids.contains(&id));
    }

    fn mark_stale(&self, id: Uuid) {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().related_capsule_ids.contains(&id))
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.stale.insert(key);
        }
    }

    /// Process merged debounced invalidations accumulated since the last
    /// flush; intended to be driven by a timer in the engine's background
    /// loop on the configured window.
    pub fn flush_debounced(&self) {
        let ids: HashSet<Uuid> = self.pending_invalidations.iter().map(|e| *e).collect();
        self.pending_invalidations.clear();
        for id in ids {
            self.invalidate_now(id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
