use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub query_type: String,
    pub related_capsule_ids: BTreeSet<Uuid>,
    /// Number of successful reads, used as an eviction tiebreaker.
    pub hit_count: u64,
    /// Updated on every read; the primary eviction ordering is
    /// least-recently-accessed, with `hit_count` breaking ties.
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
