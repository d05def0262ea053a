use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapsuleType {
    Insight,
    Decision,
    Fact,
    Question,
    Artifact,
}

/// The unit of knowledge: a content-addressed, optionally signed capsule
/// with typed lineage (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capsule {
    pub id: Uuid,
    pub content_hash: String,
    /// Ed25519 signature over `content_hash`, base64-encoded. Only present
    /// on trusted writes.
    pub signature: Option<String>,
    pub merkle_root: Option<String>,

    pub title: String,
    pub content: String,
    pub content_type: String,
    #[serde(rename = "type")]
    pub capsule_type: CapsuleType,
    pub tags: BTreeSet<String>,
    pub trust_level: u8,

    /// Immutable once written: the ordered parent ids and the
    /// `parent_merkle_root` frozen at fork time.
    pub parent_ids: Vec<Uuid>,
    pub parent_merkle_root: Option<String>,

    pub embedding: Option<Vec<f32>>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Capsule {
    /// True if this capsule has no parents and is therefore a lineage root.
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}
