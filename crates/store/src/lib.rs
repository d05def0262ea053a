//! Capsule Store port (C2) and Event Bus (C3).

pub mod event_bus;
pub mod memory;
pub mod query;

pub use event_bus::{EventBus, EventHandler};
pub use memory::{InMemoryGraphStore, StoreChainPersister};
pub use query::{CapsuleQuery, TenantId};

use async_trait::async_trait;
use forge_primitives::{Capsule, SemanticEdge, StoreError};
use uuid::Uuid;

/// The abstract port the core depends on; the persistence backend proper
/// (an on-disk graph store with vector KNN search) is out of scope — see
/// spec §1 — and implementations of this trait are adapters onto it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_capsule(&self, capsule: Capsule) -> Result<(), StoreError>;
    async fn update_capsule(&self, capsule: Capsule) -> Result<(), StoreError>;
    async fn delete_capsule(&self, id: Uuid) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Capsule>, StoreError>;

    /// Returns `(capsule, cosine_similarity)` pairs, the source excluded,
    /// ordered by descending similarity.
    async fn find_similar_by_embedding(
        &self,
        embedding: &[f32],
        k: usize,
        min_sim: f32,
    ) -> Result<Vec<(Capsule, f32)>, StoreError>;

    async fn create_edge(&self, edge: SemanticEdge) -> Result<(), StoreError>;
    async fn ancestors(&self, id: Uuid, max_depth: usize) -> Result<Vec<Capsule>, StoreError>;
    async fn query(&self, query: &query::CapsuleQuery) -> Result<Vec<Capsule>, StoreError>;
}
