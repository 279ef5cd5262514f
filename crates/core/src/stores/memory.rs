use crate::embeddings::cosine_similarity;
use crate::models::{ScoredChunk, TextChunk};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Process-local cosine store, rebuilt for every uploaded document.
pub struct InMemoryStore {
    vector_size: usize,
    entries: RwLock<Vec<(TextChunk, Vec<f32>)>>,
}

impl InMemoryStore {
    pub fn new(vector_size: usize) -> Self {
        Self {
            vector_size,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn reset(&self) -> Result<(), SearchError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn index_chunks(
        &self,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), SearchError> {
        if chunks.len() != embeddings.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        if let Some(bad) = embeddings.iter().find(|embedding| embedding.len() != self.vector_size) {
            return Err(SearchError::Request(format!(
                "embedding dimension {} != {}",
                bad.len(),
                self.vector_size
            )));
        }

        let mut entries = self.entries.write().await;
        entries.extend(chunks.iter().cloned().zip(embeddings.iter().cloned()));
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        if query_vector.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let entries = self.entries.read().await;
        let mut scored = entries
            .iter()
            .map(|(chunk, embedding)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query_vector, embedding) as f64,
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk.chunk_index.cmp(&right.chunk.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
