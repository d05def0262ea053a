use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One hop of an insight cascade (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeEvent {
    pub id: Uuid,
    pub source_overlay: String,
    pub insight_type: String,
    pub insight_data: Value,
    pub hop_count: u32,
    pub max_hops: u32,
    /// Ordered, used to break cycles: an overlay that already emitted on
    /// this path is never invoked again for it.
    pub visited_overlays: Vec<String>,
    pub impact_score: f32,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
}

impl CascadeEvent {
    pub fn within_hop_budget(&self) -> bool {
        self.hop_count <= self.max_hops
    }

    pub fn has_visited(&self, overlay_id: &str) -> bool {
        self.visited_overlays.iter().any(|o| o == overlay_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStatus {
    Active,
    Completed,
}

/// The directed chain of events produced by one originating insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeChain {
    pub cascade_id: Uuid,
    pub initiated_by: String,
    pub initiated_at: DateTime<Utc>,
    /// `(order, event)` pairs; `order` is the monotone append index used as
    /// the `HAS_EVENT.order` relationship attribute.
    pub events: Vec<(u64, CascadeEvent)>,
    pub total_hops: u32,
    pub overlays_affected: BTreeSet<String>,
    pub insights_generated: u32,
    pub actions_triggered: u32,
    pub errors_encountered: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CascadeStatus,
}

impl CascadeChain {
    pub fn new(cascade_id: Uuid, initiated_by: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            cascade_id,
            initiated_by: initiated_by.into(),
            initiated_at: now,
            events: Vec::new(),
            total_hops: 0,
            overlays_affected: BTreeSet::new(),
            insights_generated: 0,
            actions_triggered: 0,
            errors_encountered: 0,
            completed_at: None,
            status: CascadeStatus::Active,
        }
    }

    /// Append the originating event (`order = 0`). Does not count towards
    /// `total_hops`, which tracks derivative hops only.
    pub fn append_origin(&mut self, event: CascadeEvent) {
        let order = self.events.len() as u64;
        self.events.push((order, event));
    }

    /// Append a derivative event produced by an overlay, keeping
    /// `total_hops`/`overlays_affected`/`insights_generated` in sync.
    pub fn append_derivative(&mut self, event: CascadeEvent) {
        let order = self.events.len() as u64;
        self.overlays_affected.insert(event.source_overlay.clone());
        self.total_hops += 1;
        self.insights_generated += 1;
        self.events.push((order, event));
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = CascadeStatus::Completed;
        self.completed_at = Some(now);
    }
}
