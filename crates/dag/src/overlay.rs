//! Overlay Registry + Lifecycle.
//!
//! An overlay is a polymorphic unit that observes cascade events and may
//! emit derivative insights. The registry is the single source of truth
//! for which overlays exist and in what order they run; overlays never
//! observe each other directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use forge_primitives::{BusEvent, CascadeEvent, OverlayError};

/// Tagged-variant overlay kinds, so dispatch is exhaustive-matched rather than
/// probing for methods at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayKind {
    Security,
    Ml,
    Governance,
    Lineage,
    Custom(String),
}

/// A derivative insight an overlay wants to fan out as a new cascade hop.
#[derive(Debug, Clone)]
pub struct DerivativeInsight {
    pub insight_type: String,
    pub insight_data: serde_json::Value,
    /// Multiplier applied to the parent's `impact_score`, clamped to [0,1]
    /// by the pipeline after multiplication.
    pub impact_weight: f32,
}

/// Outcome of an overlay observing a bus event outside of a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayDecision {
    Continue,
    Halt,
}

#[async_trait]
pub trait Overlay: Send + Sync {
    fn overlay_id(&self) -> &str;
    /// Lower runs earlier.
    fn priority(&self) -> i32;
    fn kind(&self) -> OverlayKind;

    /// Observe a general bus event; default is a no-op pass-through.
    async fn process(&self, _event: &BusEvent) -> OverlayDecision {
        OverlayDecision::Continue
    }

    /// Called by the cascade pipeline for each event this overlay is
    /// eligible to react to (i.e. not already in `visited_overlays`).
    async fn on_insight(
        &self,
        event: &CascadeEvent,
    ) -> Result<Vec<DerivativeInsight>, OverlayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Registered,
    Active,
    Stopped,
}

struct Entry {
    overlay: Arc<dyn Overlay>,
    state: OverlayState,
    degraded: bool,
    registration_order: u64,
}

/// Registers, activates, and orders overlays. The registry is the single
/// source of truth the Cascade Pipeline drives its fan-out from.
pub struct OverlayRegistry {
    entries: DashMap<String, Entry>,
    next_registration_order: AtomicU64,
}

impl Default for OverlayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_registration_order: AtomicU64::new(0),
        }
    }

    /// Rejects a duplicate id.
    pub fn register(&self, overlay: Arc<dyn Overlay>) -> Result<(), OverlayError> {
        let id = overlay.overlay_id().to_string();
        if self.entries.contains_key(&id) {
            return Err(OverlayError {
                overlay_id: id,
                message: "overlay already registered".into(),
            });
        }
        let registration_order = self.next_registration_order.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            id,
            Entry {
                overlay,
                state: OverlayState::Registered,
                degraded: false,
                registration_order,
            },
        );
        Ok(())
    }

    /// Idempotent: activating an already-active overlay is a no-op.
    pub fn activate(&self, id: &str) -> Result<(), OverlayError> {
        let mut entry = self.entries.get_mut(id).ok_or_else(|| OverlayError {
            overlay_id: id.to_string(),
            message: "no such overlay".into(),
        })?;
        entry.state = OverlayState::Active;
        Ok(())
    }

    /// Idempotent: deactivating an already-stopped overlay is a no-op.
    pub fn deactivate(&self, id: &str) -> Result<(), OverlayError> {
        let mut entry = self.entries.get_mut(id).ok_or_else(|| OverlayError {
            overlay_id: id.to_string(),
            message: "no such overlay".into(),
        })?;
        entry.state = OverlayState::Stopped;
        Ok(())
    }

    /// An overlay that raised is kept active but flagged degraded; it still
    /// runs, but the flag is visible for observability.
    pub fn mark_degraded(&self, id: &str) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.degraded = true;
        }
    }

    pub fn is_degraded(&self, id: &str) -> bool {
        self.entries.get(id).map(|e| e.degraded).unwrap_or(false)
    }

    /// Stable order: priority ascending, then registration order ascending.
    pub fn iterate_active_ordered(&self) -> Vec<Arc<dyn Overlay>> {
        let mut active: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.state == OverlayState::Active)
            .map(|e| (e.overlay.clone(), e.overlay.priority(), e.registration_order))
            .collect();
        active.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
        active.into_iter().map(|(overlay, ..)| overlay).collect()
    }

    /// Best-effort parallel deactivation of every overlay under a timeout.
    pub async fn stop_all(&self, timeout: Duration) {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let _ = tokio::time::timeout(timeout, async {
            for id in ids {
                let _ = self.deactivate(&id);
            }
        })
        .await;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopOverlay {
        id: String,
        priority: i32,
    }

    #[async_trait]
    impl Overlay for NoopOverlay {
        fn overlay_id(&self) -> &str {
            &self.id
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn kind(&self) -> OverlayKind {
            OverlayKind::Custom("test".into())
        }
        async fn on_insight(
            &self,
            _event: &CascadeEvent,
        ) -> Result<Vec<DerivativeInsight>, OverlayError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn rejects_duplicate_registration() {
        let registry = OverlayRegistry::new();
        registry
            .register(Arc::new(NoopOverlay {
                id: "a".into(),
                priority: 1,
            }))
            .unwrap();
        let err = registry
            .register(Arc::new(NoopOverlay {
                id: "a".into(),
                priority: 2,
            }))
            .unwrap_err();
        assert_eq!(err.overlay_id, "a");
    }

    #[test]
    fn orders_by_priority_then_registration() {
        let registry = OverlayRegistry::new();
        registry
            .register(Arc::new(NoopOverlay {
                id: "b".into(),
                priority: 2,
            }))
            .unwrap();
        registry
            .register(Arc::new(NoopOverlay {
                id: "a".into(),
                priority: 1,
            }))
            .unwrap();
        registry.activate("a").unwrap();
        registry.activate("b").unwrap();

        let ordered = registry.iterate_active_ordered();
        let ids: Vec<_> = ordered.iter().map(|o| o.overlay_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn activate_and_deactivate_are_idempotent() {
        let registry = OverlayRegistry::new();
        registry
            .register(Arc::new(NoopOverlay {
                id: "a".into(),
                priority: 1,
            }))
            .unwrap();
        registry.activate("a").unwrap();
        registry.activate("a").unwrap();
        assert_eq!(registry.iterate_active_ordered().len(), 1);
        registry.deactivate("a").unwrap();
        registry.deactivate("a").unwrap();
        assert!(registry.iterate_active_ordered().is_empty());
    }
}
