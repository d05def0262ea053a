//! Composition root (spec §9): builds one `Engine` value from a
//! `ForgeConfig`, replacing the source's package-level globals
//! (`_query_cache`, `_partition_manager`, `_forge_tracer`) with explicit
//! construction and dependency injection.

pub mod config;
pub mod context;
pub mod engine;

pub use config::{
    CacheConfig, CacheInvalidationStrategy, CascadeConfig, ConfigError, FederationConfig,
    FeatureToggles, ForgeConfig, LineageConfig, PartitionConfig, SemanticConfig, StoreConfig,
};
pub use context::{Context, SpanHandle, Tracer, TracingTracer};
pub use engine::{Engine, EngineError, EngineProviders};
