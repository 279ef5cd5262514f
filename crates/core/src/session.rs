use crate::availability::StrategyAvailability;
use crate::chat::{build_prompt, format_context};
use crate::embeddings::Embedder;
use crate::error::{ExtractionError, SessionError};
use crate::indexer::Indexer;
use crate::models::{ChatMessage, ChatRole, Document, ExtractionMethod, ExtractionReport};
use crate::pipeline::ExtractionPipeline;
use crate::traits::{ChatModel, VectorIndex};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct LoadedDocument {
    pub document: Document,
    pub method: ExtractionMethod,
    pub segment_count: usize,
    pub chunk_count: usize,
    pub report: ExtractionReport,
}

/// One user's conversation about one uploaded PDF at a time.
pub struct ChatSession<M, E, V> {
    pipeline: Arc<ExtractionPipeline>,
    availability: Arc<StrategyAvailability>,
    indexer: Indexer<E, V>,
    model: M,
    top_k: usize,
    loaded: Option<LoadedDocument>,
    messages: Vec<ChatMessage>,
}

impl<M, E, V> ChatSession<M, E, V>
where
    M: ChatModel + Send + Sync,
    E: Embedder + Send + Sync,
    V: VectorIndex + Send + Sync,
{
    pub fn new(
        pipeline: Arc<ExtractionPipeline>,
        availability: StrategyAvailability,
        indexer: Indexer<E, V>,
        model: M,
    ) -> Self {
        Self {
            pipeline,
            availability: Arc::new(availability),
            indexer,
            model,
            top_k: DEFAULT_TOP_K,
            loaded: None,
            messages: Vec::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn loaded(&self) -> Option<&LoadedDocument> {
        self.loaded.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Extracts and indexes `path`, replacing any loaded document. On failure
    /// nothing stays loaded.
    pub async fn upload(&mut self, path: &Path) -> Result<&LoadedDocument, SessionError> {
        self.loaded = None;

        match self.load(path).await {
            Ok(loaded) => Ok(self.loaded.insert(loaded)),
            Err(error) => {
                warn!(path = %path.display(), %error, "upload rejected");
                self.indexer.clear().await.ok();
                Err(error)
            }
        }
    }

    async fn load(&self, path: &Path) -> Result<LoadedDocument, SessionError> {
        let pipeline = Arc::clone(&self.pipeline);
        let availability = Arc::clone(&self.availability);
        let path = path.to_path_buf();
        let (document, extraction) = tokio::task::spawn_blocking(move || {
            let document = Document::open(&path)?;
            let extraction = pipeline.extract(&document, &availability)?;
            Ok::<_, ExtractionError>((document, extraction))
        })
        .await
        .map_err(|error| SessionError::Worker(error.to_string()))??;

        let index = self.indexer.index(&extraction.segments).await?;

        info!(
            source = %document.source,
            method = %extraction.method,
            chunks = index.chunk_count,
            "document ready for questions"
        );

        Ok(LoadedDocument {
            document,
            method: extraction.method,
            segment_count: extraction.segments.len(),
            chunk_count: index.chunk_count,
            report: extraction.report,
        })
    }

    /// Answers from the loaded document. Both the question and the reply
    /// (or the error shown in its place) are kept in the transcript.
    pub async fn ask(&mut self, question: &str) -> Result<String, SessionError> {
        self.messages.push(ChatMessage::new(ChatRole::User, question));

        let outcome = self.answer(question).await;
        let reply = match &outcome {
            Ok(answer) => answer.clone(),
            Err(SessionError::NoDocument) => "Please upload a valid PDF first!".to_string(),
            Err(error) => format!("Error generating response: {error}"),
        };
        self.messages.push(ChatMessage::new(ChatRole::Assistant, reply));

        outcome
    }

    async fn answer(&self, question: &str) -> Result<String, SessionError> {
        if self.loaded.is_none() {
            return Err(SessionError::NoDocument);
        }

        let query_vector = self.indexer.embedder().embed(question);
        let hits = self.indexer.store().search(&query_vector, self.top_k).await?;
        let prompt = build_prompt(&format_context(&hits), question);

        Ok(self.model.complete(&prompt).await?)
    }
}
