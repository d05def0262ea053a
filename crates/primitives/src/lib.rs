//! Core domain types shared across the Forge engine.

pub mod canonical_json;
pub mod capsule;
pub mod cascade;
pub mod cache_entry;
pub mod edge;
pub mod error;
pub mod event;
pub mod partition;
pub mod peer;
pub mod sync_payload;

pub use canonical_json::to_canonical_json;
pub use capsule::{Capsule, CapsuleType};
pub use cascade::{CascadeChain, CascadeEvent, CascadeStatus};
pub use cache_entry::CacheEntry;
pub use edge::{SemanticEdge, SemanticRelationType};
pub use event::BusEvent;
pub use error::{
    CacheError, CascadeError, FederationError, ForgeError, IntegrityError, OverlayError,
    PartitionError, StoreError,
};
pub use partition::{Partition, PartitionState, PartitionStrategy, PartitionStats};
pub use peer::{Peer, PeerCapabilities, PeerStatus};
pub use sync_payload::{Deletion, SyncPayload};

/// Hex-encoded SHA-256 digest, used for content hashes and merkle roots.
pub type HexHash = String;
