use crate::error::{ChatError, SearchError};
use crate::models::{ScoredChunk, TextChunk};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex {
    /// Drops everything indexed so far; the store is rebuilt per document.
    async fn reset(&self) -> Result<(), SearchError>;

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError>;

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError>;
}

#[async_trait]
pub trait ChatModel {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}
