use crate::models::ExtractionMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Executables the OCR strategies shell out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPaths {
    pub tesseract: PathBuf,
    pub mutool: PathBuf,
    pub pdftoppm: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            tesseract: PathBuf::from("tesseract"),
            mutool: PathBuf::from("mutool"),
            pdftoppm: PathBuf::from("pdftoppm"),
        }
    }
}

/// How OCR output is handed to the indexer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OcrLayout {
    /// One document-level segment with a literal `--- Page N ---` marker per page.
    #[default]
    Delimited,
    /// One segment per page, page number carried in the segment.
    PerPage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Tesseract language set, e.g. `eng` or `ara+eng`.
    pub languages: String,
    pub page_segmentation_mode: u8,
    /// `None` skips contrast enhancement.
    pub contrast: Option<f32>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            page_segmentation_mode: 6,
            contrast: Some(1.8),
        }
    }
}

impl OcrSettings {
    pub fn language_codes(&self) -> Vec<&str> {
        self.languages
            .split('+')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Zoom applied by the primary rasterizer (72 dpi times this factor).
    pub magnification: f32,
    pub secondary_dpi: u32,
    pub ocr: OcrSettings,
    pub ocr_layout: OcrLayout,
    pub enabled: BTreeSet<ExtractionMethod>,
    pub tools: ToolPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            magnification: 3.0,
            secondary_dpi: 200,
            ocr: OcrSettings::default(),
            ocr_layout: OcrLayout::default(),
            enabled: ExtractionMethod::ALL.into_iter().collect(),
            tools: ToolPaths::default(),
        }
    }
}

impl PipelineConfig {
    pub fn primary_dpi(&self) -> u32 {
        (72.0 * self.magnification.max(0.1)).round() as u32
    }

    pub fn is_enabled(&self, method: ExtractionMethod) -> bool {
        self.enabled.contains(&method)
    }

    pub fn disable(mut self, method: ExtractionMethod) -> Self {
        self.enabled.remove(&method);
        self
    }
}
