//! Embedding provider contract

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into fixed-dimension vectors.
///
/// One instance is shared by ingestion and retrieval so that documents and
/// queries land in the same vector space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Output dimension
    fn dimensions(&self) -> usize;

    /// Model name recorded in persisted indexes
    fn name(&self) -> &str;

    /// Whether the backing service is reachable
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
