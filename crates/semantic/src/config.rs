use std::collections::HashSet;

use forge_primitives::SemanticRelationType;

/// Tuning for candidate selection and classification (spec §4.7).
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub similarity_threshold: f32,
    pub confidence_threshold: f32,
    pub max_candidates: usize,
    pub enabled: bool,
    pub enabled_types: HashSet<SemanticRelationType>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            confidence_threshold: 0.7,
            max_candidates: 20,
            enabled: true,
            enabled_types: HashSet::from([
                SemanticRelationType::Supports,
                SemanticRelationType::Contradicts,
                SemanticRelationType::Elaborates,
                SemanticRelationType::References,
                SemanticRelationType::RelatedTo,
            ]),
        }
    }
}
