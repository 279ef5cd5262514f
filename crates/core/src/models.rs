use crate::error::ExtractionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extraction strategies in the order the pipeline tries them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    TextLayerPrimary,
    TextLayerSecondary,
    ImageOcrPrimary,
    ImageOcrSecondary,
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 4] = [
        ExtractionMethod::TextLayerPrimary,
        ExtractionMethod::TextLayerSecondary,
        ExtractionMethod::ImageOcrPrimary,
        ExtractionMethod::ImageOcrSecondary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::TextLayerPrimary => "text-layer-primary",
            ExtractionMethod::TextLayerSecondary => "text-layer-secondary",
            ExtractionMethod::ImageOcrPrimary => "image-ocr-primary",
            ExtractionMethod::ImageOcrSecondary => "image-ocr-secondary",
        }
    }

    pub fn is_text_layer(&self) -> bool {
        matches!(
            self,
            ExtractionMethod::TextLayerPrimary | ExtractionMethod::TextLayerSecondary
        )
    }

    pub fn is_ocr(&self) -> bool {
        !self.is_text_layer()
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The PDF handed to the pipeline. Never mutated while it is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub source: String,
    pub checksum: String,
}

impl Document {
    pub fn open(path: &Path) -> Result<Self, ExtractionError> {
        let source = path.to_string_lossy().to_string();
        let bytes = std::fs::read(path).map_err(|error| ExtractionError::DocumentUnreadable {
            path: source.clone(),
            source: error,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);

        Ok(Self {
            path: path.to_path_buf(),
            source,
            checksum: format!("{:x}", hasher.finalize()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextSegment {
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
    pub method: ExtractionMethod,
}

/// What happened to one strategy during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum StrategyOutcome {
    Succeeded { chars: usize },
    Empty,
    Failed { details: String },
    Unavailable { missing: String },
    Disabled,
    NotAttempted,
}

impl StrategyOutcome {
    pub fn was_attempted(&self) -> bool {
        matches!(
            self,
            StrategyOutcome::Succeeded { .. }
                | StrategyOutcome::Empty
                | StrategyOutcome::Failed { .. }
        )
    }
}

impl fmt::Display for StrategyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyOutcome::Succeeded { chars } => write!(f, "succeeded ({chars} chars)"),
            StrategyOutcome::Empty => f.write_str("attempted, no text"),
            StrategyOutcome::Failed { details } => write!(f, "failed: {details}"),
            StrategyOutcome::Unavailable { missing } => {
                write!(f, "skipped, unavailable: {missing}")
            }
            StrategyOutcome::Disabled => f.write_str("skipped, disabled by configuration"),
            StrategyOutcome::NotAttempted => f.write_str("not attempted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyAttempt {
    pub method: ExtractionMethod,
    pub outcome: StrategyOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionReport {
    pub source: String,
    pub attempts: Vec<StrategyAttempt>,
}

impl ExtractionReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            attempts: Vec::new(),
        }
    }

    pub fn record(&mut self, method: ExtractionMethod, outcome: StrategyOutcome) {
        self.attempts.push(StrategyAttempt { method, outcome });
    }

    pub fn outcome(&self, method: ExtractionMethod) -> Option<&StrategyOutcome> {
        self.attempts
            .iter()
            .find(|attempt| attempt.method == method)
            .map(|attempt| &attempt.outcome)
    }

    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|attempt| format!("{}: {}", attempt.method, attempt.outcome))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub method: ExtractionMethod,
    pub segments: Vec<TextSegment>,
    pub report: ExtractionReport,
}

impl ExtractionResult {
    pub fn total_text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.content.as_str())
            .collect::<String>()
    }

    pub fn total_chars(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.content.chars().count())
            .sum()
    }
}

/// A retrieval window cut from one segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub source: String,
    pub page: Option<u32>,
    pub method: ExtractionMethod,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_document_fingerprints_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"abc").unwrap();

        let first = Document::open(&path).unwrap();
        let second = Document::open(&path).unwrap();
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(first.source, path.to_string_lossy());
        assert!(Document::open(&dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn methods_parse_from_their_tags() {
        for method in ExtractionMethod::ALL {
            assert_eq!(ExtractionMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(ExtractionMethod::parse("pdfplumber"), None);
    }

    #[test]
    fn method_serializes_as_kebab_tag() {
        let json = serde_json::to_string(&ExtractionMethod::ImageOcrPrimary).unwrap();
        assert_eq!(json, "\"image-ocr-primary\"");
    }

    #[test]
    fn report_summary_lists_every_attempt() {
        let mut report = ExtractionReport::new("scan.pdf");
        report.record(ExtractionMethod::TextLayerPrimary, StrategyOutcome::Empty);
        report.record(
            ExtractionMethod::ImageOcrPrimary,
            StrategyOutcome::Unavailable {
                missing: "tesseract".to_string(),
            },
        );

        let summary = report.summary();
        assert!(summary.contains("text-layer-primary: attempted, no text"));
        assert!(summary.contains("image-ocr-primary: skipped, unavailable: tesseract"));
        assert!(report.outcome(ExtractionMethod::TextLayerPrimary).unwrap().was_attempted());
    }
}
