//! Cascade Pipeline — the heart of the engine.
//!
//! Runs an originating insight through the active overlays, possibly
//! producing a tree of derivative insights, and records every hop as a
//! [`CascadeChain`] for replay and audit. The dispatch loop mirrors the
//! DAG store's pending/ready/apply shape (`forge_dag::overlay`'s registry
//! plays the role of the applier; the work queue plays the role of
//! `apply_pending`'s ready-set loop) but orders by overlay priority rather
//! than causal parent completeness, since a cascade is a tree grown
//! forward from one origin rather than a DAG reassembled out of order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use forge_primitives::{CascadeChain, CascadeEvent};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::overlay::OverlayRegistry;

#[derive(Debug, Error)]
#[error("failed to persist cascade chain: {0}")]
pub struct PersistError(pub String);

/// Dependency-injected sink for chain state, mirroring `DeltaApplier<T>`.
#[async_trait]
pub trait ChainPersister: Send + Sync {
    async fn persist_chain(&self, chain: &CascadeChain) -> Result<(), PersistError>;
}

/// A persister that does nothing, useful for tests and for engines run
/// without a backing Capsule Store.
pub struct NullPersister;

#[async_trait]
impl ChainPersister for NullPersister {
    async fn persist_chain(&self, _chain: &CascadeChain) -> Result<(), PersistError> {
        Ok(())
    }
}

pub struct OriginatingInsight {
    pub source_overlay: String,
    pub insight_type: String,
    pub insight_data: Value,
    pub max_hops: u32,
    pub correlation_id: Uuid,
}

/// Metrics for cascade-bound drops: a `CascadeError` is dropped silently with
/// a metric increment rather than surfaced to the caller.
#[derive(Debug, Default)]
pub struct CascadeMetrics {
    pub hop_budget_exceeded: AtomicU64,
}

impl CascadeMetrics {
    pub fn hop_budget_exceeded_count(&self) -> u64 {
        self.hop_budget_exceeded.load(Ordering::Relaxed)
    }
}

pub struct CascadePipeline {
    registry: Arc<OverlayRegistry>,
    persister: Arc<dyn ChainPersister>,
    metrics: CascadeMetrics,
}

impl CascadePipeline {
    pub fn new(registry: Arc<OverlayRegistry>, persister: Arc<dyn ChainPersister>) -> Self {
        Self {
            registry,
            persister,
            metrics: CascadeMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &CascadeMetrics {
        &self.metrics
    }

    /// Drive one originating insight to completion, returning the finished
    /// (or still-active, if persistence kept failing) chain.
    pub async fn run(&self, insight: OriginatingInsight) -> CascadeChain {
        let now = Utc::now();
        let mut chain = CascadeChain::new(Uuid::new_v4(), insight.source_overlay.clone(), now);

        let origin_event = CascadeEvent {
            id: Uuid::new_v4(),
            source_overlay: insight.source_overlay,
            insight_type: insight.insight_type,
            insight_data: insight.insight_data,
            hop_count: 0,
            max_hops: insight.max_hops,
            visited_overlays: Vec::new(),
            impact_score: 1.0,
            timestamp: now,
            correlation_id: insight.correlation_id,
        };
        chain.append_origin(origin_event.clone());

        let mut had_persist_failure = !self.persist_with_retry(&chain).await;

        let mut queue = VecDeque::new();
        queue.push_back(origin_event);

        while let Some(event) = queue.pop_front() {
            if !event.within_hop_budget() {
                // Malformed: the event's own hop_count already exceeds its
                // max_hops. This cannot happen for events this pipeline
                // produced itself, only for externally-injected ones.
                chain.errors_encountered += 1;
                continue;
            }

            let eligible: Vec<_> = self
                .registry
                .iterate_active_ordered()
                .into_iter()
                .filter(|overlay| !event.has_visited(overlay.overlay_id()))
                .collect();

            // Dispatch concurrently but fold results back in priority order
            // so sibling derivatives append in a stable, deterministic
            // sequence.
            let outcomes =
                futures_util::future::join_all(eligible.iter().map(|o| o.on_insight(&event)))
                    .await;

            for (overlay, outcome) in eligible.iter().zip(outcomes) {
                let derivatives = match outcome {
                    Ok(derivatives) => derivatives,
                    Err(_err) => {
                        // Isolate: the overlay is marked degraded but stays
                        // active, siblings are unaffected.
                        self.registry.mark_degraded(overlay.overlay_id());
                        chain.errors_encountered += 1;
                        continue;
                    }
                };

                for derivative in derivatives {
                    let child_hop = event.hop_count + 1;
                    if child_hop > event.max_hops {
                        self.metrics.hop_budget_exceeded.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    let mut visited = event.visited_overlays.clone();
                    visited.push(overlay.overlay_id().to_string());

                    let child_impact = (event.impact_score * derivative.impact_weight).clamp(0.0, 1.0);

                    let child_event = CascadeEvent {
                        id: Uuid::new_v4(),
                        source_overlay: overlay.overlay_id().to_string(),
                        insight_type: derivative.insight_type,
                        insight_data: derivative.insight_data,
                        hop_count: child_hop,
                        max_hops: event.max_hops,
                        visited_overlays: visited,
                        impact_score: child_impact,
                        timestamp: Utc::now(),
                        correlation_id: event.correlation_id,
                    };

                    chain.append_derivative(child_event.clone());
                    if !self.persist_with_retry(&chain).await {
                        had_persist_failure = true;
                    }
                    queue.push_back(child_event);
                }
            }
        }

        if !had_persist_failure {
            chain.complete(Utc::now());
            let _ = self.persist_with_retry(&chain).await;
        }

        chain
    }

    /// Exponential backoff, up to 3 attempts, for a transient store error.
    async fn persist_with_retry(&self, chain: &CascadeChain) -> bool {
        let mut delay = Duration::from_millis(20);
        for attempt in 0..3 {
            match self.persister.persist_chain(chain).await {
                Ok(()) => return true,
                Err(_) if attempt < 2 => {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(_) => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{DerivativeInsight, Overlay, OverlayKind};
    use forge_primitives::{CascadeStatus, OverlayError};
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct EchoOverlay {
        id: &'static str,
        priority: i32,
    }

    #[async_trait]
    impl Overlay for EchoOverlay {
        fn overlay_id(&self) -> &str {
            self.id
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn kind(&self) -> OverlayKind {
            OverlayKind::Custom("echo".into())
        }
        async fn on_insight(
            &self,
            _event: &CascadeEvent,
        ) -> Result<Vec<DerivativeInsight>, OverlayError> {
            Ok(vec![DerivativeInsight {
                insight_type: "echo".into(),
                insight_data: json!({}),
                impact_weight: 1.0,
            }])
        }
    }

    fn registry_with(overlays: Vec<Arc<dyn Overlay>>) -> Arc<OverlayRegistry> {
        let registry = Arc::new(OverlayRegistry::new());
        for overlay in overlays {
            let id = overlay.overlay_id().to_string();
            registry.register(overlay).unwrap();
            registry.activate(&id).unwrap();
        }
        registry
    }

    /// Scenario S1.
    #[tokio::test]
    async fn cascade_hop_bound_two_overlays() {
        let registry = registry_with(vec![
            Arc::new(EchoOverlay { id: "A", priority: 1 }),
            Arc::new(EchoOverlay { id: "B", priority: 2 }),
        ]);
        let pipeline = CascadePipeline::new(registry, Arc::new(NullPersister));

        let chain = pipeline
            .run(OriginatingInsight {
                source_overlay: "X".into(),
                insight_type: "origin".into(),
                insight_data: json!({}),
                max_hops: 2,
                correlation_id: Uuid::new_v4(),
            })
            .await;

        assert_eq!(chain.events.len(), 5);
        assert_eq!(chain.total_hops, 4);
        assert_eq!(chain.status, CascadeStatus::Completed);

        let hops_and_sources: Vec<_> = chain
            .events
            .iter()
            .map(|(_, e)| (e.hop_count, e.source_overlay.clone(), e.visited_overlays.clone()))
            .collect();
        assert_eq!(hops_and_sources[0], (0, "X".into(), vec![]));
        assert_eq!(hops_and_sources[1], (1, "A".into(), vec!["A".to_string()]));
        assert_eq!(hops_and_sources[2], (1, "B".into(), vec!["B".to_string()]));
        assert_eq!(
            hops_and_sources[3],
            (2, "B".into(), vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(
            hops_and_sources[4],
            (2, "A".into(), vec!["B".to_string(), "A".to_string()])
        );
    }

    /// Scenario S2.
    #[tokio::test]
    async fn cascade_cycle_prevention_single_overlay() {
        let registry = registry_with(vec![Arc::new(EchoOverlay { id: "A", priority: 1 })]);
        let pipeline = CascadePipeline::new(registry, Arc::new(NullPersister));

        let chain = pipeline
            .run(OriginatingInsight {
                source_overlay: "X".into(),
                insight_type: "origin".into(),
                insight_data: json!({}),
                max_hops: 5,
                correlation_id: Uuid::new_v4(),
            })
            .await;

        assert_eq!(chain.events.len(), 2);
        assert_eq!(chain.status, CascadeStatus::Completed);
    }

    struct FailingOverlay {
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Overlay for FailingOverlay {
        fn overlay_id(&self) -> &str {
            "failing"
        }
        fn priority(&self) -> i32 {
            1
        }
        fn kind(&self) -> OverlayKind {
            OverlayKind::Custom("failing".into())
        }
        async fn on_insight(
            &self,
            _event: &CascadeEvent,
        ) -> Result<Vec<DerivativeInsight>, OverlayError> {
            self.called.store(true, Ordering::SeqCst);
            Err(OverlayError {
                overlay_id: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn failing_overlay_is_isolated_and_marked_degraded() {
        let called = Arc::new(AtomicBool::new(false));
        let registry = registry_with(vec![Arc::new(FailingOverlay {
            called: called.clone(),
        })]);
        let pipeline = CascadePipeline::new(registry.clone(), Arc::new(NullPersister));

        let chain = pipeline
            .run(OriginatingInsight {
                source_overlay: "X".into(),
                insight_type: "origin".into(),
                insight_data: json!({}),
                max_hops: 3,
                correlation_id: Uuid::new_v4(),
            })
            .await;

        assert!(called.load(Ordering::SeqCst));
        assert_eq!(chain.errors_encountered, 1);
        assert!(registry.is_degraded("failing"));
        // the cascade still completes: an isolated overlay error never
        // aborts the chain
        assert_eq!(chain.status, CascadeStatus::Completed);
    }
}
