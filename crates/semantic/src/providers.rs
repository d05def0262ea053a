//! Pluggable embedding and LLM provider seams. Production adapters call
//! out to an embedding model and a hosted LLM respectively; tests and
//! offline tooling can swap in deterministic stand-ins.

use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}
