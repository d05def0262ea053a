use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capsule::Capsule;
use crate::edge::SemanticEdge;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deletion {
    pub capsule_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

/// A signed, content-hashed bundle of changes exchanged between peers
/// (spec §3). `content_hash` covers `(capsules, edges, deletions)` only;
/// `signature` covers the canonical JSON of the whole payload with
/// `signature` blanked to `""`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub sync_id: Uuid,
    pub peer_id: String,
    pub timestamp: DateTime<Utc>,
    pub capsules: Vec<Capsule>,
    pub edges: Vec<SemanticEdge>,
    pub deletions: Vec<Deletion>,
    pub content_hash: String,
    pub signature: String,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}
