use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forge_primitives::{Capsule, CapsuleType, SemanticEdge};
use forge_store::GraphStore;
use serde_json::json;

use crate::classify::{classification_prompt, parse_classification};
use crate::config::DetectionConfig;
use crate::providers::{EmbeddingProvider, LlmProvider};

#[derive(Debug, Default, Clone)]
pub struct DetectionResult {
    pub capsule_id: uuid::Uuid,
    pub candidates_analyzed: usize,
    pub edges_created: usize,
    pub edges: Vec<SemanticEdge>,
    pub errors: Vec<String>,
    pub duration_ms: f64,
}

impl DetectionResult {
    fn new(capsule_id: uuid::Uuid) -> Self {
        Self {
            capsule_id,
            ..Default::default()
        }
    }
}

fn capsule_type_label(capsule_type: CapsuleType) -> &'static str {
    match capsule_type {
        CapsuleType::Insight => "INSIGHT",
        CapsuleType::Decision => "DECISION",
        CapsuleType::Fact => "FACT",
        CapsuleType::Question => "QUESTION",
        CapsuleType::Artifact => "ARTIFACT",
    }
}

/// Auto-classifies semantic relationships between a capsule and its
/// embedding-nearest neighbors (spec §4.7).
pub struct SemanticEdgeDetector<S: GraphStore> {
    store: Arc<S>,
    embedding: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    config: DetectionConfig,
}

impl<S: GraphStore> SemanticEdgeDetector<S> {
    pub fn new(
        store: Arc<S>,
        embedding: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            store,
            embedding,
            llm,
            config,
        }
    }

    pub async fn analyze_capsule(&self, capsule: &Capsule, created_by: &str) -> DetectionResult {
        let start = Instant::now();
        let mut result = DetectionResult::new(capsule.id);

        if !self.config.enabled {
            return result;
        }

        let candidates = match self.find_similar_capsules(capsule).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(capsule_id = %capsule.id, error = %e, "detection_failed");
                result.errors.push(e);
                result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                return result;
            }
        };
        result.candidates_analyzed = candidates.len();

        if candidates.is_empty() {
            tracing::debug!(capsule_id = %capsule.id, "no_candidates_found");
            result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            return result;
        }

        for (candidate, similarity) in candidates {
            let classification = self.classify_relationship(capsule, &candidate).await;

            let Some(relationship_type) = classification.relationship_type else {
                continue;
            };
            if !self.config.enabled_types.contains(&relationship_type)
                || classification.confidence < self.config.confidence_threshold
            {
                continue;
            }

            let edge = SemanticEdge {
                source_id: capsule.id,
                target_id: candidate.id,
                relationship_type,
                confidence: classification.confidence,
                reason: classification.reasoning.clone(),
                auto_detected: true,
                properties: std::collections::BTreeMap::from([
                    ("similarity".to_string(), json!(similarity)),
                    ("reasoning".to_string(), json!(classification.reasoning)),
                    ("detected_at".to_string(), json!(Utc::now().to_rfc3339())),
                ]),
                created_by: created_by.to_string(),
                created_at: Utc::now(),
            };

            match self.store.create_edge(edge.clone()).await {
                Ok(()) => {
                    result.edges.push(edge);
                    result.edges_created += 1;
                }
                Err(e) => {
                    tracing::error!(source_id = %capsule.id, target_id = %candidate.id, error = %e, "edge_creation_failed");
                    result
                        .errors
                        .push(format!("failed to create edge to {}: {e}", candidate.id));
                }
            }
        }

        result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            capsule_id = %capsule.id,
            candidates = result.candidates_analyzed,
            created = result.edges_created,
            duration_ms = result.duration_ms,
            "edge_detection_complete"
        );
        result
    }

    pub async fn batch_analyze(
        &self,
        capsule_ids: &[uuid::Uuid],
        created_by: &str,
    ) -> Vec<DetectionResult> {
        let mut results = Vec::with_capacity(capsule_ids.len());
        for &id in capsule_ids {
            match self.store.find_by_id(id).await {
                Ok(Some(capsule)) => results.push(self.analyze_capsule(&capsule, created_by).await),
                Ok(None) => {
                    let mut result = DetectionResult::new(id);
                    result.errors.push(format!("capsule {id} not found"));
                    results.push(result);
                }
                Err(e) => {
                    let mut result = DetectionResult::new(id);
                    result.errors.push(e.to_string());
                    results.push(result);
                }
            }
        }
        results
    }

    async fn find_similar_capsules(&self, capsule: &Capsule) -> Result<Vec<(Capsule, f32)>, String> {
        let embedding = match &capsule.embedding {
            Some(embedding) => embedding.clone(),
            None => {
                let content = format!("{}\n{}", capsule.title, capsule.content);
                self.embedding.embed(&content).await?
            }
        };

        let similar = self
            .store
            .find_similar_by_embedding(
                &embedding,
                self.config.max_candidates + 1,
                self.config.similarity_threshold,
            )
            .await
            .map_err(|e| e.to_string())?;

        let mut results: Vec<(Capsule, f32)> =
            similar.into_iter().filter(|(c, _)| c.id != capsule.id).collect();
        results.truncate(self.config.max_candidates);
        Ok(results)
    }

    async fn classify_relationship(
        &self,
        source: &Capsule,
        target: &Capsule,
    ) -> crate::classify::RelationshipClassification {
        let prompt = classification_prompt(
            &source.title,
            capsule_type_label(source.capsule_type),
            &source.content,
            &target.title,
            capsule_type_label(target.capsule_type),
            &target.content,
        );

        match self.llm.complete(&prompt).await {
            Ok(response) => parse_classification(&response),
            Err(e) => {
                tracing::warn!(source_id = %source.id, target_id = %target.id, error = %e, "classification_failed");
                crate::classify::RelationshipClassification {
                    relationship_type: None,
                    confidence: 0.0,
                    reasoning: format!("llm call failed: {e}"),
                    bidirectional: false,
                }
            }
        }
    }
}
