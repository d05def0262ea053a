//! An in-memory reference [`GraphStore`] implementation. The real
//! persistence backend (an on-disk graph store with vector KNN search) is
//! explicitly out of scope (spec §1); this exists so the rest of the
//! engine is runnable and testable without one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use forge_dag::{ChainPersister, PersistError};
use forge_primitives::{BusEvent, Capsule, CascadeChain, SemanticEdge, StoreError};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::event_bus::EventBus;
use crate::query::CapsuleQuery;
use crate::GraphStore;

#[derive(Default)]
pub struct InMemoryGraphStore {
    capsules: DashMap<Uuid, Capsule>,
    edges: RwLock<Vec<SemanticEdge>>,
    event_bus: Option<Arc<EventBus>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus: Some(event_bus),
            ..Self::default()
        }
    }

    async fn emit(&self, event_type: &str, capsule_id: Uuid) {
        if let Some(bus) = &self.event_bus {
            bus.publish(BusEvent::new(
                event_type,
                serde_json::json!({ "capsule_id": capsule_id }),
                Uuid::new_v4(),
            ))
            .await;
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_capsule(&self, capsule: Capsule) -> Result<(), StoreError> {
        let id = capsule.id;
        if self.capsules.contains_key(&id) {
            return Err(StoreError::Conflict(format!("capsule {id} already exists")));
        }
        self.capsules.insert(id, capsule);
        self.emit("capsule.created", id).await;
        Ok(())
    }

    async fn update_capsule(&self, capsule: Capsule) -> Result<(), StoreError> {
        let id = capsule.id;
        let mut entry = self
            .capsules
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if capsule.version <= entry.version {
            return Err(StoreError::Conflict(format!(
                "stale version for capsule {id}: got {}, have {}",
                capsule.version, entry.version
            )));
        }
        *entry = capsule;
        drop(entry);
        self.emit("capsule.updated", id).await;
        Ok(())
    }

    async fn delete_capsule(&self, id: Uuid) -> Result<(), StoreError> {
        self.capsules
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.emit("capsule.deleted", id).await;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Capsule>, StoreError> {
        Ok(self.capsules.get(&id).map(|c| c.clone()))
    }

    async fn find_similar_by_embedding(
        &self,
        embedding: &[f32],
        k: usize,
        min_sim: f32,
    ) -> Result<Vec<(Capsule, f32)>, StoreError> {
        let mut scored: Vec<(Capsule, f32)> = self
            .capsules
            .iter()
            .filter_map(|entry| {
                let capsule = entry.value();
                let candidate_embedding = capsule.embedding.as_deref()?;
                let sim = cosine_similarity(embedding, candidate_embedding);
                (sim >= min_sim).then(|| (capsule.clone(), sim))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn create_edge(&self, edge: SemanticEdge) -> Result<(), StoreError> {
        self.edges.write().push(edge);
        Ok(())
    }

    async fn ancestors(&self, id: Uuid, max_depth: usize) -> Result<Vec<Capsule>, StoreError> {
        let mut result = Vec::new();
        let mut frontier = vec![id];
        let mut depth = 0;
        while depth < max_depth && !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for current in frontier {
                let Some(capsule) = self.capsules.get(&current) else {
                    continue;
                };
                for parent_id in &capsule.parent_ids {
                    if let Some(parent) = self.capsules.get(parent_id) {
                        result.push(parent.clone());
                        next_frontier.push(*parent_id);
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }
        Ok(result)
    }

    async fn query(&self, query: &CapsuleQuery) -> Result<Vec<Capsule>, StoreError> {
        let mut results: Vec<Capsule> = self
            .capsules
            .iter()
            .map(|e| e.value().clone())
            .filter(|capsule| {
                query
                    .tags
                    .as_ref()
                    .map(|tags| !tags.is_disjoint(&capsule.tags))
                    .unwrap_or(true)
            })
            .filter(|capsule| {
                query
                    .owner
                    .as_ref()
                    .map(|owner| &capsule.created_by == owner)
                    .unwrap_or(true)
            })
            .collect();
        results.sort_by_key(|c| c.created_at);
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}

/// Adapts the in-memory store's chain table onto [`ChainPersister`], the
/// dependency-injected sink the Cascade Pipeline writes through.
#[derive(Default)]
pub struct StoreChainPersister {
    chains: RwLock<HashMap<Uuid, CascadeChain>>,
}

impl StoreChainPersister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cascade_id: Uuid) -> Option<CascadeChain> {
        self.chains.read().get(&cascade_id).cloned()
    }

    /// Purge chains in state `completed` older than `days_old` (spec
    /// §4.5 retention rule).
    pub fn purge_completed_older_than(&self, days_old: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(days_old);
        let mut chains = self.chains.write();
        let before = chains.len();
        chains.retain(|_, chain| {
            !(chain.status == forge_primitives::CascadeStatus::Completed
                && chain.completed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        before - chains.len()
    }
}

#[async_trait]
impl ChainPersister for StoreChainPersister {
    async fn persist_chain(&self, chain: &CascadeChain) -> Result<(), PersistError> {
        self.chains
            .write()
            .insert(chain.cascade_id, chain.clone());
        Ok(())
    }
}
