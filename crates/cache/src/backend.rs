//! Optional external cache backend (Redis-shaped). The `QueryCache` always
//! keeps its own metadata index for fingerprint bookkeeping, eviction, and
//! invalidation regardless of whether a backend is attached; the backend,
//! when present, is used as a write-through value mirror and its
//! unavailability never fails a read — a cache miss just falls through to
//! recomputing the value.

use std::time::Duration;

use async_trait::async_trait;
use forge_primitives::CacheError;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// The default in-memory backend; always available, so it never surfaces
/// `BackendUnavailable`.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: dashmap::DashMap<String, Vec<u8>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
