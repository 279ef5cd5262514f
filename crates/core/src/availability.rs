use crate::config::{OcrSettings, ToolPaths};
use crate::models::ExtractionMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which optional OCR dependencies are usable. Detected once at startup and
/// passed into every pipeline run; it is never refreshed per document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyAvailability {
    pub ocr_engine: bool,
    pub primary_rasterizer: bool,
    pub secondary_rasterizer: bool,
    /// Languages reported by the OCR engine. Empty when unknown.
    pub ocr_languages: Vec<String>,
}

impl StrategyAvailability {
    pub fn all() -> Self {
        Self {
            ocr_engine: true,
            primary_rasterizer: true,
            secondary_rasterizer: true,
            ocr_languages: Vec::new(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub async fn detect(tools: &ToolPaths) -> Self {
        let ocr_engine = probe(&tools.tesseract, &["--version"])
            .await
            .is_some_and(|output| output.status.success());

        let ocr_languages = if ocr_engine {
            probe(&tools.tesseract, &["--list-langs"])
                .await
                .map(|output| {
                    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                    text.push('\n');
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                    parse_language_list(&text)
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        // Older poppler builds exit non-zero on `-v`, so spawning is enough.
        let primary_rasterizer = probe(&tools.mutool, &["-v"]).await.is_some();
        let secondary_rasterizer = probe(&tools.pdftoppm, &["-v"]).await.is_some();

        let availability = Self {
            ocr_engine,
            primary_rasterizer,
            secondary_rasterizer,
            ocr_languages,
        };

        info!(
            ocr_engine = availability.ocr_engine,
            primary_rasterizer = availability.primary_rasterizer,
            secondary_rasterizer = availability.secondary_rasterizer,
            languages = %availability.ocr_languages.join(","),
            "strategy availability detected"
        );

        availability
    }

    /// Names the missing dependency for `method`, or `None` when it can run.
    pub fn missing_for(&self, method: ExtractionMethod) -> Option<String> {
        let rasterizer = match method {
            ExtractionMethod::TextLayerPrimary | ExtractionMethod::TextLayerSecondary => {
                return None
            }
            ExtractionMethod::ImageOcrPrimary => (self.primary_rasterizer, "mutool"),
            ExtractionMethod::ImageOcrSecondary => (self.secondary_rasterizer, "pdftoppm"),
        };

        let mut missing = Vec::new();
        if !self.ocr_engine {
            missing.push("tesseract");
        }
        if !rasterizer.0 {
            missing.push(rasterizer.1);
        }

        if missing.is_empty() {
            None
        } else {
            Some(missing.join(" + "))
        }
    }

    pub fn missing_languages(&self, settings: &OcrSettings) -> Vec<String> {
        if self.ocr_languages.is_empty() {
            return Vec::new();
        }

        settings
            .language_codes()
            .into_iter()
            .filter(|code| !self.ocr_languages.iter().any(|installed| installed == code))
            .map(str::to_string)
            .collect()
    }
}

async fn probe(binary: &Path, args: &[&str]) -> Option<Output> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(PROBE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(error)) => {
            debug!(binary = %binary.display(), %error, "tool probe failed");
            None
        }
        Err(_) => {
            warn!(binary = %binary.display(), "tool probe timed out");
            None
        }
    }
}

fn parse_language_list(text: &str) -> Vec<String> {
    let mut languages = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of"))
        .filter(|line| !line.contains(' '))
        .map(str::to_string)
        .collect::<Vec<_>>();
    languages.sort();
    languages.dedup();
    languages
}
