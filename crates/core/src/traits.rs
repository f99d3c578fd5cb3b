use crate::embeddings::DIMENSION_PROBE_TEXT;
use crate::error::{EmbeddingError, GenerationError, StoreError};
use crate::models::{PreparedDocument, ScoredChunk};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Incrementally delivered generated text.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Learns the vector width by embedding a fixed sample string.
    async fn probe_dimension(&self) -> Result<usize, EmbeddingError> {
        let sample = self.embed(DIMENSION_PROBE_TEXT).await?;
        if sample.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        Ok(sample.len())
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe_image(&self, jpeg: &[u8], prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    async fn delete_index(&self, index: &str) -> Result<(), StoreError>;

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), StoreError>;

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[PreparedDocument],
    ) -> Result<BulkOutcome, StoreError>;

    /// Makes every document written so far visible to search and count.
    async fn refresh_index(&self, index: &str) -> Result<(), StoreError>;

    async fn count_documents(&self, index: &str) -> Result<u64, StoreError>;

    async fn search_keyword(
        &self,
        index: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn search_knn(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;
}
