use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticRelationType {
    // Symmetric: stored once, surfaced in both directions by the query layer.
    RelatedTo,
    Contradicts,
    // Directed: no inverse.
    Supports,
    Elaborates,
    Supersedes,
    References,
    Implements,
    Extends,
}

impl SemanticRelationType {
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::RelatedTo | Self::Contradicts)
    }

    /// Symmetric types are their own inverse; directed types have none.
    /// Query-time surfacing never synthesizes a directed inverse (spec §9).
    pub fn inverse(self) -> Option<Self> {
        self.is_symmetric().then_some(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticEdge {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship_type: SemanticRelationType,
    pub confidence: f32,
    pub reason: String,
    pub auto_detected: bool,
    pub properties: BTreeMap<String, Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
