pub mod availability;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod raster;
pub mod session;
pub mod stores;
pub mod traits;

pub use availability::StrategyAvailability;
pub use chat::{build_prompt, format_context, ChatModelConfig, GroqChatModel};
pub use chunking::{build_chunks, ChunkingConfig};
pub use config::{OcrLayout, OcrSettings, PipelineConfig, ToolPaths};
pub use embeddings::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    BackendError, ChatError, ExtractionError, IndexError, SearchError, SessionError, StrategyError,
};
pub use extractor::{LopdfExtractor, PageText, PdfExtractExtractor, PdfExtractor};
pub use indexer::{IndexReport, Indexer};
pub use models::{
    ChatMessage, ChatRole, Document, ExtractionMethod, ExtractionReport, ExtractionResult,
    ScoredChunk, StrategyAttempt, StrategyOutcome, TextChunk, TextSegment,
};
pub use ocr::{enhance_contrast, OcrEngine, TesseractEngine};
pub use pipeline::{ExtractionPipeline, PipelineBackends};
pub use raster::{MutoolRasterizer, PdftoppmRasterizer, RasterPage, Rasterizer};
pub use session::{ChatSession, LoadedDocument, DEFAULT_TOP_K};
pub use stores::{InMemoryStore, QdrantStore};
pub use traits::{ChatModel, VectorIndex};
