use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A typed event published on the in-process Event Bus (spec §4.3).
/// `event_type` follows the `capsule.*` / `cascade.*` / `overlay.*` /
/// `tool.call` families named in the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_type: String,
    pub payload: Value,
    /// Propagates across a whole cascade for tracing.
    pub correlation_id: Uuid,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, payload: Value, correlation_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            correlation_id,
        }
    }
}
