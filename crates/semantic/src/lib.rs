//! Semantic-Edge Detector (C7): embedding-KNN candidate search followed by
//! LLM classification of the relationship, behind pluggable provider traits.

mod classify;
mod config;
mod detector;
mod providers;

pub use classify::{classification_prompt, parse_classification, RelationshipClassification};
pub use config::DetectionConfig;
pub use detector::{DetectionResult, SemanticEdgeDetector};
pub use providers::{EmbeddingProvider, LlmProvider};
