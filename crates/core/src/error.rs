use crate::models::{ExtractionMethod, ExtractionReport};
use thiserror::Error;

/// Failures raised by a single extraction backend (text layer, rasterizer, OCR).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("{tool} failed: {details}")]
    ToolFailed { tool: String, details: String },

    #[error("{0} produced no output")]
    NoOutput(String),
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{method} unavailable: {missing}")]
    Unavailable {
        method: ExtractionMethod,
        missing: String,
    },

    #[error("{method} failed: {source}")]
    Execution {
        method: ExtractionMethod,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document is not readable: {path}: {source}")]
    DocumentUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no extraction strategy produced text for {}: {}", .0.source, .0.summary())]
    Exhausted(ExtractionReport),
}

impl ExtractionError {
    pub fn report(&self) -> Option<&ExtractionReport> {
        match self {
            ExtractionError::Exhausted(report) => Some(report),
            ExtractionError::DocumentUnreadable { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("chunking produced no chunks for {0}")]
    NoChunks(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding model {model} failed: {details}")]
    Embedding { model: String, details: String },

    #[error("vector store failed: {0}")]
    VectorStore(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid chat endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("chat model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("chat model returned an empty response")]
    EmptyResponse,

    #[error("missing api key for the chat model")]
    MissingApiKey,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document is loaded; upload a pdf first")]
    NoDocument,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] SearchError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("extraction worker stopped: {0}")]
    Worker(String),
}
