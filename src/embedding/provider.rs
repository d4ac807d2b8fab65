use async_trait::async_trait;

use crate::core::errors::KnowledgeError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// provider name (e.g. "openai", "lmstudio", "cached")
    fn name(&self) -> &str;

    /// model identifier; vectors from different models are not comparable
    fn model(&self) -> &str;

    /// embed a single text; fails with `KnowledgeError::Provider`
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;
}
