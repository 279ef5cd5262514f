use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::models::TextSegment;
use crate::traits::VectorIndex;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub source: String,
    pub chunk_count: usize,
    pub embedding_model: String,
}

/// Chunks, embeds and stores extracted segments. Every call replaces the
/// store's contents, so a failed call never leaves a partial index behind
/// for the next question.
pub struct Indexer<E, V> {
    embedder: E,
    store: V,
    chunking: ChunkingConfig,
}

impl<E, V> Indexer<E, V>
where
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(embedder: E, store: V, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            store,
            chunking,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    pub async fn index(&self, segments: &[TextSegment]) -> Result<IndexReport, IndexError> {
        let source = segments
            .first()
            .map(|segment| segment.source.clone())
            .unwrap_or_default();

        self.store.reset().await?;

        let chunks = build_chunks(segments, self.chunking)?;
        if chunks.is_empty() {
            return Err(IndexError::NoChunks(source));
        }

        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_batch(&texts);
        if let Some(bad) = embeddings
            .iter()
            .find(|embedding| embedding.len() != self.embedder.dimensions())
        {
            return Err(IndexError::Embedding {
                model: self.embedder.model_name().to_string(),
                details: format!(
                    "produced {} dimensions, expected {}",
                    bad.len(),
                    self.embedder.dimensions()
                ),
            });
        }

        if let Err(error) = self.store.index_chunks(&chunks, &embeddings).await {
            self.store.reset().await.ok();
            return Err(error.into());
        }

        info!(
            source = %source,
            chunk_count = chunks.len(),
            model = self.embedder.model_name(),
            "document indexed"
        );

        Ok(IndexReport {
            source,
            chunk_count: chunks.len(),
            embedding_model: self.embedder.model_name().to_string(),
        })
    }

    /// Drops the indexed document without indexing a new one.
    pub async fn clear(&self) -> Result<(), IndexError> {
        self.store.reset().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::models::ExtractionMethod;
    use crate::stores::InMemoryStore;

    fn segment(content: &str) -> TextSegment {
        TextSegment {
            content: content.to_string(),
            source: "/tmp/handbook.pdf".to_string(),
            page: Some(1),
            method: ExtractionMethod::TextLayerPrimary,
        }
    }

    fn indexer() -> Indexer<HashingEmbedder, InMemoryStore> {
        let embedder = HashingEmbedder::default();
        let store = InMemoryStore::new(embedder.dimensions);
        Indexer::new(embedder, store, ChunkingConfig::default())
    }

    #[tokio::test]
    async fn long_segments_become_multiple_windows() {
        let indexer = indexer();
        let long = "sentence about bearings. ".repeat(120);

        let report = indexer.index(&[segment(&long)]).await.unwrap();

        assert!(report.chunk_count >= 3);
        assert_eq!(indexer.store().len().await, report.chunk_count);
        assert_eq!(report.source, "/tmp/handbook.pdf");
    }

    #[tokio::test]
    async fn reindexing_replaces_previous_document() {
        let indexer = indexer();
        indexer.index(&[segment("first document"), segment("more")]).await.unwrap();

        let report = indexer.index(&[segment("second document")]).await.unwrap();

        assert_eq!(report.chunk_count, 1);
        assert_eq!(indexer.store().len().await, 1);
    }

    #[tokio::test]
    async fn whitespace_only_segments_produce_no_chunks() {
        let indexer = indexer();
        let error = indexer.index(&[segment("  \n\n  ")]).await.unwrap_err();
        assert!(matches!(error, IndexError::NoChunks(_)));
    }

    #[tokio::test]
    async fn wrong_embedding_width_is_a_model_failure() {
        let embedder = HashingEmbedder { dimensions: 8 };
        let store = InMemoryStore::new(8);
        struct Truncating(HashingEmbedder);
        impl Embedder for Truncating {
            fn model_name(&self) -> &str {
                "truncating"
            }
            fn dimensions(&self) -> usize {
                self.0.dimensions
            }
            fn embed(&self, text: &str) -> Vec<f32> {
                let mut vector = self.0.embed(text);
                vector.pop();
                vector
            }
        }

        let indexer = Indexer::new(Truncating(embedder), store, ChunkingConfig::default());
        let error = indexer.index(&[segment("text")]).await.unwrap_err();

        assert!(matches!(error, IndexError::Embedding { model, .. } if model == "truncating"));
        assert!(indexer.store().is_empty().await);
    }
}
