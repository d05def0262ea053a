mod backend;
mod cache;
mod fingerprint;
mod invalidation;

pub use backend::{CacheBackend, InMemoryBackend};
pub use cache::{QueryCache, QueryCacheConfig};
pub use fingerprint::{cache_key, fingerprint, sanitize_key_segment};
pub use invalidation::InvalidationStrategy;
