//! `Engine`: the single composed value an instance of Forge runs as. Built
//! once at startup from a [`ForgeConfig`] plus the pluggable providers the
//! product spec deliberately leaves un-prescribed (embedding/LLM, cross-
//! partition query execution, federation transport); nothing here is a
//! package-level global (spec §9).

use std::sync::Arc;

use ed25519_dalek::SigningKey;

use forge_cache::QueryCache;
use forge_dag::{CascadePipeline, OverlayRegistry};
use forge_federation::{FederationClient, HttpTransport};
use forge_lineage::{DeltaCompressor, TieredLineageStorage};
use forge_partition::{CrossPartitionQueryExecutor, PartitionManager, PartitionQueryCallback, PartitionRouter};
use forge_semantic::{EmbeddingProvider, LlmProvider, SemanticEdgeDetector};
use forge_store::{EventBus, InMemoryGraphStore, StoreChainPersister};

use crate::config::{ConfigError, ForgeConfig};
use crate::context::{Context, Tracer, TracingTracer};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("federation is enabled but no signing key was provided")]
    MissingFederationSigningKey,
    #[error("semantic detection is enabled but no embedding/LLM provider was supplied")]
    MissingSemanticProviders,
    #[error("failed to construct federation transport: {0}")]
    FederationTransport(#[from] forge_primitives::FederationError),
}

/// Dependencies the product spec leaves as pluggable seams (§1 Non-goals:
/// no prescribed LLM/embedding provider) rather than things `Engine` can
/// default-construct on its own.
#[derive(Default)]
pub struct EngineProviders {
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub federation_signing_key: Option<SigningKey>,
    pub partition_query_callback: Option<Arc<dyn PartitionQueryCallback>>,
    pub tracer: Option<Arc<dyn Tracer>>,
}

/// The engine for one Forge instance: every component composed once,
/// passed around as `Arc<Engine>` rather than reached for through globals.
pub struct Engine {
    pub config: ForgeConfig,
    pub store: Arc<InMemoryGraphStore>,
    pub event_bus: Arc<EventBus>,
    pub cache: Option<Arc<QueryCache>>,
    pub semantic_detector: Option<Arc<SemanticEdgeDetector<InMemoryGraphStore>>>,
    pub partition_manager: Option<Arc<PartitionManager>>,
    partition_query_callback: Option<Arc<dyn PartitionQueryCallback>>,
    pub overlay_registry: Arc<OverlayRegistry>,
    pub cascade_pipeline: Arc<CascadePipeline>,
    pub chain_persister: Arc<StoreChainPersister>,
    pub federation_client: Option<Arc<FederationClient<HttpTransport>>>,
    pub lineage_storage: Arc<TieredLineageStorage>,
    pub delta_compressor: Arc<DeltaCompressor>,
    tracer: Arc<dyn Tracer>,
}

impl Engine {
    /// Builds every component from `config`, honoring the feature toggles
    /// in `config.features`. Fails fast (§11.2: `ConfigError` is only fatal
    /// at startup) rather than constructing a half-wired engine.
    pub fn build(config: ForgeConfig, providers: EngineProviders) -> Result<Self, EngineError> {
        if config.features.enable_federation && providers.federation_signing_key.is_none() {
            return Err(EngineError::MissingFederationSigningKey);
        }
        if config.features.enable_semantic_detection
            && (providers.embedding.is_none() || providers.llm.is_none())
        {
            return Err(EngineError::MissingSemanticProviders);
        }

        let tracer = providers.tracer.unwrap_or_else(|| Arc::new(TracingTracer));

        let event_bus = Arc::new(EventBus::new(config.store.event_bus_max_concurrent_handlers));
        let store = Arc::new(InMemoryGraphStore::with_event_bus(event_bus.clone()));

        let cache = config.features.enable_caching.then(|| {
            Arc::new(QueryCache::new(config.cache.clone().into_query_cache_config(Default::default())))
        });

        let semantic_detector = match (providers.embedding, providers.llm) {
            (Some(embedding), Some(llm)) if config.features.enable_semantic_detection => {
                Some(Arc::new(SemanticEdgeDetector::new(
                    store.clone(),
                    embedding,
                    llm,
                    config.semantic.clone().into_detection_config(true),
                )))
            }
            _ => None,
        };

        let partition_manager = config.features.enable_partitioning.then(|| {
            Arc::new(PartitionManager::new(
                config.partition.default_max_capsules,
                config.partition.rebalance_threshold,
            ))
        });

        let overlay_registry = Arc::new(OverlayRegistry::new());
        let chain_persister = Arc::new(StoreChainPersister::new());
        let cascade_pipeline = Arc::new(CascadePipeline::new(overlay_registry.clone(), chain_persister.clone()));

        let federation_client = providers
            .federation_signing_key
            .map(|signing_key| {
                Ok::<_, forge_primitives::FederationError>(Arc::new(FederationClient::new(
                    config.federation.instance_id.clone(),
                    config.federation.instance_name.clone(),
                    signing_key,
                    HttpTransport::new()?,
                )))
            })
            .transpose()?;

        let lineage_storage = Arc::new(TieredLineageStorage::new(config.lineage.into_tier_config()));
        let delta_compressor = Arc::new(DeltaCompressor::new(config.lineage.max_delta_chain));

        Ok(Self {
            config,
            store,
            event_bus,
            cache,
            semantic_detector,
            partition_manager,
            partition_query_callback: providers.partition_query_callback,
            overlay_registry,
            cascade_pipeline,
            chain_persister,
            federation_client,
            lineage_storage,
            delta_compressor,
            tracer,
        })
    }

    /// A fresh request-scoped context carrying this engine's `Tracer`.
    pub fn context(&self) -> Context {
        Context::new(self.tracer.clone())
    }

    pub fn partition_router(&self) -> Option<PartitionRouter<'_>> {
        self.partition_manager.as_deref().map(PartitionRouter::new)
    }

    /// Builds a cross-partition executor borrowed from this engine's
    /// manager; `None` if partitioning is disabled or no query callback
    /// was supplied at build time.
    pub fn partition_executor(&self) -> Option<CrossPartitionQueryExecutor<'_>> {
        let manager = self.partition_manager.as_deref()?;
        let callback = self.partition_query_callback.clone()?;
        Some(CrossPartitionQueryExecutor::new(
            manager,
            callback,
            self.config.partition.executor_max_concurrency,
        ))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;

    struct StubEmbedding;
    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(vec![0.0; 8])
        }
    }

    struct StubLlm;
    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, String> {
            Ok(String::new())
        }
    }

    struct StubCallback;
    #[async_trait]
    impl PartitionQueryCallback for StubCallback {
        async fn query_partition(
            &self,
            _partition_id: &str,
            _query: &str,
            _params: &Value,
            _limit: usize,
        ) -> Result<Vec<Value>, String> {
            Ok(vec![])
        }
    }

    #[test]
    fn builds_with_default_config_and_no_optional_features() {
        let engine = Engine::build(ForgeConfig::default(), EngineProviders::default()).unwrap();
        assert!(engine.cache.is_some());
        assert!(engine.semantic_detector.is_none());
        assert!(engine.partition_manager.is_none());
        assert!(engine.federation_client.is_none());
    }

    #[test]
    fn rejects_federation_enabled_without_signing_key() {
        let mut config = ForgeConfig::default();
        config.features.enable_federation = true;
        let result = Engine::build(config, EngineProviders::default());
        assert!(matches!(result, Err(EngineError::MissingFederationSigningKey)));
    }

    #[test]
    fn rejects_semantic_detection_without_providers() {
        let mut config = ForgeConfig::default();
        config.features.enable_semantic_detection = true;
        let result = Engine::build(config, EngineProviders::default());
        assert!(matches!(result, Err(EngineError::MissingSemanticProviders)));
    }

    #[test]
    fn wires_semantic_detector_when_providers_and_toggle_are_present() {
        let mut config = ForgeConfig::default();
        config.features.enable_semantic_detection = true;
        let providers = EngineProviders {
            embedding: Some(Arc::new(StubEmbedding)),
            llm: Some(Arc::new(StubLlm)),
            ..Default::default()
        };
        let engine = Engine::build(config, providers).unwrap();
        assert!(engine.semantic_detector.is_some());
    }

    #[test]
    fn wires_partitioning_and_executor_when_enabled() {
        let mut config = ForgeConfig::default();
        config.features.enable_partitioning = true;
        let providers = EngineProviders {
            partition_query_callback: Some(Arc::new(StubCallback)),
            ..Default::default()
        };
        let engine = Engine::build(config, providers).unwrap();
        assert!(engine.partition_manager.is_some());
        assert!(engine.partition_router().is_some());
        assert!(engine.partition_executor().is_some());
    }

    #[test]
    fn context_carries_a_working_tracer() {
        let engine = Engine::build(ForgeConfig::default(), EngineProviders::default()).unwrap();
        let ctx = engine.context();
        let _span = ctx.span("test");
    }
}
