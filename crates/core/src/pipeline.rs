use crate::availability::StrategyAvailability;
use crate::config::{OcrLayout, PipelineConfig};
use crate::error::{ExtractionError, StrategyError};
use crate::extractor::{LopdfExtractor, PdfExtractExtractor, PdfExtractor};
use crate::models::{
    Document, ExtractionMethod, ExtractionReport, ExtractionResult, StrategyOutcome, TextSegment,
};
use crate::ocr::{enhance_contrast, OcrEngine, TesseractEngine};
use crate::raster::{MutoolRasterizer, PdftoppmRasterizer, Rasterizer};
use std::fs::File;
use tracing::{debug, info, warn};

pub type SharedExtractor = Box<dyn PdfExtractor + Send + Sync>;
pub type SharedRasterizer = Box<dyn Rasterizer + Send + Sync>;
pub type SharedOcrEngine = Box<dyn OcrEngine + Send + Sync>;

/// The concrete backends behind the four strategies.
pub struct PipelineBackends {
    pub primary_text: SharedExtractor,
    pub secondary_text: SharedExtractor,
    pub primary_raster: SharedRasterizer,
    pub secondary_raster: SharedRasterizer,
    pub ocr: SharedOcrEngine,
}

impl PipelineBackends {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            primary_text: Box::new(LopdfExtractor),
            secondary_text: Box::new(PdfExtractExtractor),
            primary_raster: Box::new(MutoolRasterizer::new(
                config.tools.mutool.clone(),
                config.primary_dpi(),
            )),
            secondary_raster: Box::new(PdftoppmRasterizer::new(
                config.tools.pdftoppm.clone(),
                config.secondary_dpi,
            )),
            ocr: Box::new(TesseractEngine::new(config.tools.tesseract.clone())),
        }
    }
}

/// Tries text-layer extraction, then OCR, in a fixed order. The first
/// strategy that yields non-blank text wins; nothing is merged across
/// strategies. A failing strategy only means "no output".
pub struct ExtractionPipeline {
    config: PipelineConfig,
    backends: PipelineBackends,
}

impl ExtractionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let backends = PipelineBackends::from_config(&config);
        Self { config, backends }
    }

    pub fn with_backends(config: PipelineConfig, backends: PipelineBackends) -> Self {
        Self { config, backends }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extract(
        &self,
        document: &Document,
        availability: &StrategyAvailability,
    ) -> Result<ExtractionResult, ExtractionError> {
        File::open(&document.path).map_err(|source| ExtractionError::DocumentUnreadable {
            path: document.source.clone(),
            source,
        })?;

        info!(source = %document.source, "extracting document");

        let mut report = ExtractionReport::new(document.source.clone());
        let mut winner: Option<(ExtractionMethod, Vec<TextSegment>)> = None;

        for method in ExtractionMethod::ALL {
            if winner.is_some() {
                report.record(method, StrategyOutcome::NotAttempted);
                continue;
            }

            if !self.config.is_enabled(method) {
                debug!(%method, "strategy disabled");
                report.record(method, StrategyOutcome::Disabled);
                continue;
            }

            match self.run_strategy(method, document, availability) {
                Ok(segments) => {
                    let chars = segments
                        .iter()
                        .map(|segment| segment.content.trim().chars().count())
                        .sum::<usize>();

                    if chars > 0 {
                        info!(%method, chars, segments = segments.len(), "strategy succeeded");
                        report.record(method, StrategyOutcome::Succeeded { chars });
                        winner = Some((method, segments));
                    } else {
                        info!(%method, "strategy produced no text");
                        report.record(method, StrategyOutcome::Empty);
                    }
                }
                Err(StrategyError::Unavailable { missing, .. }) => {
                    info!(%method, %missing, "strategy skipped");
                    report.record(method, StrategyOutcome::Unavailable { missing });
                }
                Err(error @ StrategyError::Execution { .. }) => {
                    warn!(%method, %error, "strategy failed, trying next");
                    report.record(
                        method,
                        StrategyOutcome::Failed {
                            details: error.to_string(),
                        },
                    );
                }
            }
        }

        match winner {
            Some((method, segments)) => Ok(ExtractionResult {
                method,
                segments,
                report,
            }),
            None => {
                warn!(
                    source = %document.source,
                    summary = %report.summary(),
                    "extraction exhausted"
                );
                Err(ExtractionError::Exhausted(report))
            }
        }
    }

    fn run_strategy(
        &self,
        method: ExtractionMethod,
        document: &Document,
        availability: &StrategyAvailability,
    ) -> Result<Vec<TextSegment>, StrategyError> {
        if let Some(missing) = availability.missing_for(method) {
            return Err(StrategyError::Unavailable { method, missing });
        }

        match method {
            ExtractionMethod::TextLayerPrimary => {
                self.text_layer(method, self.backends.primary_text.as_ref(), document)
            }
            ExtractionMethod::TextLayerSecondary => {
                self.text_layer(method, self.backends.secondary_text.as_ref(), document)
            }
            ExtractionMethod::ImageOcrPrimary => self.image_ocr(
                method,
                self.backends.primary_raster.as_ref(),
                document,
                availability,
            ),
            ExtractionMethod::ImageOcrSecondary => self.image_ocr(
                method,
                self.backends.secondary_raster.as_ref(),
                document,
                availability,
            ),
        }
    }

    fn text_layer(
        &self,
        method: ExtractionMethod,
        extractor: &(dyn PdfExtractor + Send + Sync),
        document: &Document,
    ) -> Result<Vec<TextSegment>, StrategyError> {
        let pages = extractor
            .extract_pages(&document.path)
            .map_err(|source| StrategyError::Execution { method, source })?;

        let segments = pages
            .into_iter()
            .filter(|page| {
                if !page.has_text() {
                    debug!(%method, page = ?page.number, "page has no text layer");
                }
                page.has_text()
            })
            .map(|page| TextSegment {
                content: page.text,
                source: document.source.clone(),
                page: page.number,
                method,
            })
            .collect();

        Ok(segments)
    }

    fn image_ocr(
        &self,
        method: ExtractionMethod,
        rasterizer: &(dyn Rasterizer + Send + Sync),
        document: &Document,
        availability: &StrategyAvailability,
    ) -> Result<Vec<TextSegment>, StrategyError> {
        let missing_languages = availability.missing_languages(&self.config.ocr);
        if !missing_languages.is_empty() {
            warn!(
                %method,
                missing = %missing_languages.join(","),
                "ocr language data not installed"
            );
        }

        let pages = rasterizer
            .rasterize(&document.path)
            .map_err(|source| StrategyError::Execution { method, source })?;
        let total = pages.len();

        let mut recognized = Vec::new();
        for page in pages {
            debug!(%method, page = page.number, total, "running ocr");
            let image = match self.config.ocr.contrast {
                Some(factor) => enhance_contrast(&page.image, factor),
                None => page.image,
            };

            let text = self
                .backends
                .ocr
                .recognize(&image, &self.config.ocr)
                .map_err(|source| StrategyError::Execution { method, source })?;

            if text.trim().is_empty() {
                debug!(%method, page = page.number, "no text recognized");
                continue;
            }

            debug!(%method, page = page.number, chars = text.chars().count(), "page recognized");
            recognized.push((page.number, text));
        }

        Ok(self.layout_ocr_pages(method, document, recognized))
    }

    fn layout_ocr_pages(
        &self,
        method: ExtractionMethod,
        document: &Document,
        recognized: Vec<(u32, String)>,
    ) -> Vec<TextSegment> {
        match self.config.ocr_layout {
            OcrLayout::Delimited => {
                if recognized.is_empty() {
                    return Vec::new();
                }

                let mut content = String::new();
                for (number, text) in &recognized {
                    content.push_str(&format!("\n--- Page {number} ---\n{text}"));
                }

                vec![TextSegment {
                    content: content.trim().to_string(),
                    source: document.source.clone(),
                    page: None,
                    method,
                }]
            }
            OcrLayout::PerPage => recognized
                .into_iter()
                .map(|(number, text)| TextSegment {
                    content: text.trim().to_string(),
                    source: document.source.clone(),
                    page: Some(number),
                    method,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrSettings;
    use crate::error::BackendError;
    use crate::extractor::tests::write_text_pdf;
    use crate::extractor::PageText;
    use crate::raster::RasterPage;
    use image::{DynamicImage, GrayImage};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    enum FakeText {
        Pages(Vec<PageText>),
        Broken,
    }

    impl PdfExtractor for FakeText {
        fn name(&self) -> &'static str {
            "fake-text"
        }

        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, BackendError> {
            match self {
                FakeText::Pages(pages) => Ok(pages.clone()),
                FakeText::Broken => Err(BackendError::PdfParse("corrupt xref".to_string())),
            }
        }
    }

    /// Renders one image per page; the image width encodes the page number.
    struct FakeRaster {
        pages: u32,
    }

    impl Rasterizer for FakeRaster {
        fn name(&self) -> &'static str {
            "fake-raster"
        }

        fn rasterize(&self, _path: &Path) -> Result<Vec<RasterPage>, BackendError> {
            Ok((1..=self.pages)
                .map(|number| RasterPage {
                    number,
                    image: DynamicImage::ImageLuma8(GrayImage::new(number, 1)),
                })
                .collect())
        }
    }

    /// Returns text keyed by image width and counts calls.
    struct FakeOcr {
        by_width: HashMap<u32, String>,
        calls: Arc<AtomicUsize>,
    }

    impl OcrEngine for FakeOcr {
        fn name(&self) -> &'static str {
            "fake-ocr"
        }

        fn recognize(
            &self,
            image: &DynamicImage,
            _settings: &OcrSettings,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.by_width.get(&image.width()).cloned().unwrap_or_default())
        }
    }

    struct Fixture {
        _dir: TempDir,
        document: Document,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let document = Document::open(&path).unwrap();
        Fixture { _dir: dir, document }
    }

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number: Some(number),
            text: text.to_string(),
        }
    }

    fn ocr_texts(texts: &[(u32, &str)]) -> (FakeOcr, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = FakeOcr {
            by_width: texts
                .iter()
                .map(|(number, text)| (*number, text.to_string()))
                .collect(),
            calls: calls.clone(),
        };
        (engine, calls)
    }

    fn backends(
        primary: FakeText,
        secondary: FakeText,
        ocr: FakeOcr,
        pages: u32,
    ) -> PipelineBackends {
        PipelineBackends {
            primary_text: Box::new(primary),
            secondary_text: Box::new(secondary),
            primary_raster: Box::new(FakeRaster { pages }),
            secondary_raster: Box::new(FakeRaster { pages }),
            ocr: Box::new(ocr),
        }
    }

    fn no_contrast() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.ocr.contrast = None;
        config
    }

    #[test]
    fn text_layer_wins_over_ocr() {
        let fixture = fixture();
        let (ocr, calls) = ocr_texts(&[(1, "ocr text")]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            backends(
                FakeText::Pages(vec![page(1, "digital text")]),
                FakeText::Pages(Vec::new()),
                ocr,
                1,
            ),
        );

        let result = pipeline
            .extract(&fixture.document, &StrategyAvailability::all())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::TextLayerPrimary);
        assert!(result.method.is_text_layer());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            result.report.outcome(ExtractionMethod::ImageOcrPrimary),
            Some(&StrategyOutcome::NotAttempted)
        );
    }

    #[test]
    fn blank_pages_contribute_no_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("three-pages.pdf");
        write_text_pdf(&path, &[Some("First page text"), None, Some("Third page text")]);
        let document = Document::open(&path).unwrap();

        let pipeline = ExtractionPipeline::new(PipelineConfig::default());
        let result = pipeline
            .extract(&document, &StrategyAvailability::none())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::TextLayerPrimary);
        let pages = result.segments.iter().map(|segment| segment.page).collect::<Vec<_>>();
        assert_eq!(pages, vec![Some(1), Some(3)]);
        assert!(result.segments.iter().all(|segment| !segment.content.trim().is_empty()));
        assert!(result.segments.iter().all(|segment| segment.source == document.source));
    }

    #[test]
    fn secondary_text_layer_runs_when_primary_is_empty() {
        let fixture = fixture();
        let (ocr, _) = ocr_texts(&[]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            backends(
                FakeText::Pages(vec![page(1, "   \n"), page(2, "")]),
                FakeText::Pages(vec![page(1, "fallback text"), page(2, "  ")]),
                ocr,
                2,
            ),
        );

        let result = pipeline
            .extract(&fixture.document, &StrategyAvailability::none())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::TextLayerSecondary);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].content, "fallback text");
        assert_eq!(
            result.report.outcome(ExtractionMethod::TextLayerPrimary),
            Some(&StrategyOutcome::Empty)
        );
    }

    #[test]
    fn strategy_failure_is_not_fatal() {
        let fixture = fixture();
        let (ocr, _) = ocr_texts(&[]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            backends(
                FakeText::Broken,
                FakeText::Pages(vec![page(1, "recovered")]),
                ocr,
                1,
            ),
        );

        let result = pipeline
            .extract(&fixture.document, &StrategyAvailability::none())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::TextLayerSecondary);
        assert!(matches!(
            result.report.outcome(ExtractionMethod::TextLayerPrimary),
            Some(StrategyOutcome::Failed { details }) if details.contains("corrupt xref")
        ));
    }

    #[test]
    fn pdf_extract_fallback_keeps_page_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fallback.pdf");
        write_text_pdf(&path, &[Some("Alpha page"), None, Some("Gamma page")]);
        let document = Document::open(&path).unwrap();
        let (ocr, _) = ocr_texts(&[]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            PipelineBackends {
                primary_text: Box::new(FakeText::Broken),
                secondary_text: Box::new(crate::extractor::PdfExtractExtractor),
                primary_raster: Box::new(FakeRaster { pages: 3 }),
                secondary_raster: Box::new(FakeRaster { pages: 3 }),
                ocr: Box::new(ocr),
            },
        );

        let result = pipeline
            .extract(&document, &StrategyAvailability::none())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::TextLayerSecondary);
        let pages = result.segments.iter().map(|segment| segment.page).collect::<Vec<_>>();
        assert_eq!(pages, vec![Some(1), Some(3)]);
        assert!(result.segments[0].content.contains("Alpha page"));
        assert!(result.segments[1].content.contains("Gamma page"));
    }

    #[test]
    fn scanned_document_uses_primary_ocr_with_page_markers() {
        let fixture = fixture();
        let (ocr, calls) = ocr_texts(&[(1, "Scanned intro\n"), (3, "Scanned ending\n")]);
        let pipeline = ExtractionPipeline::with_backends(
            PipelineConfig::default(),
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 3),
        );

        let result = pipeline
            .extract(&fixture.document, &StrategyAvailability::all())
            .unwrap();

        assert_eq!(result.method, ExtractionMethod::ImageOcrPrimary);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].page, None);
        assert_eq!(
            result.segments[0].content,
            "--- Page 1 ---\nScanned intro\n\n--- Page 3 ---\nScanned ending"
        );
    }

    #[test]
    fn per_page_layout_keeps_page_numbers() {
        let fixture = fixture();
        let (ocr, _) = ocr_texts(&[(1, "one"), (2, "two")]);
        let config = PipelineConfig {
            ocr_layout: OcrLayout::PerPage,
            ..no_contrast()
        };
        let pipeline = ExtractionPipeline::with_backends(
            config,
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 2),
        );

        let result = pipeline
            .extract(&fixture.document, &StrategyAvailability::all())
            .unwrap();

        let pages = result
            .segments
            .iter()
            .map(|segment| (segment.page, segment.content.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(pages, vec![(Some(1), "one"), (Some(2), "two")]);
        assert!(!result.total_text().contains("--- Page"));
    }

    #[test]
    fn unavailable_primary_rasterizer_falls_back_to_secondary() {
        let fixture = fixture();
        let (ocr, _) = ocr_texts(&[(1, "from poppler")]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 1),
        );
        let availability = StrategyAvailability {
            primary_rasterizer: false,
            ..StrategyAvailability::all()
        };

        let result = pipeline.extract(&fixture.document, &availability).unwrap();

        assert_eq!(result.method, ExtractionMethod::ImageOcrSecondary);
        assert!(result.method.is_ocr());
        assert_eq!(
            result.report.outcome(ExtractionMethod::ImageOcrPrimary),
            Some(&StrategyOutcome::Unavailable {
                missing: "mutool".to_string()
            })
        );
    }

    #[test]
    fn blank_images_exhaust_every_strategy() {
        let fixture = fixture();
        let (ocr, calls) = ocr_texts(&[]);
        let pipeline = ExtractionPipeline::with_backends(
            no_contrast(),
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 2),
        );

        let error = pipeline
            .extract(&fixture.document, &StrategyAvailability::all())
            .unwrap_err();

        let report = error.report().unwrap();
        assert_eq!(report.attempts.len(), 4);
        assert!(report
            .attempts
            .iter()
            .all(|attempt| attempt.outcome == StrategyOutcome::Empty));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn scanned_pdf_without_ocr_tools_is_exhausted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        write_text_pdf(&path, &[None]);
        let document = Document::open(&path).unwrap();

        let pipeline = ExtractionPipeline::new(PipelineConfig::default());
        let error = pipeline
            .extract(&document, &StrategyAvailability::none())
            .unwrap_err();

        let report = error.report().unwrap();
        let methods = report.attempts.iter().map(|attempt| attempt.method).collect::<Vec<_>>();
        assert_eq!(methods, ExtractionMethod::ALL.to_vec());
        assert!(report.attempts[..2]
            .iter()
            .all(|attempt| attempt.outcome.was_attempted()));
        assert!(report.attempts[2..]
            .iter()
            .all(|attempt| matches!(attempt.outcome, StrategyOutcome::Unavailable { .. })));
        assert!(error.to_string().contains("image-ocr-secondary"));
    }

    #[test]
    fn disabled_strategies_are_reported() {
        let fixture = fixture();
        let (ocr, calls) = ocr_texts(&[(1, "text")]);
        let config = no_contrast()
            .disable(ExtractionMethod::ImageOcrPrimary)
            .disable(ExtractionMethod::ImageOcrSecondary);
        let pipeline = ExtractionPipeline::with_backends(
            config,
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 1),
        );

        let error = pipeline
            .extract(&fixture.document, &StrategyAvailability::all())
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            error.report().unwrap().outcome(ExtractionMethod::ImageOcrSecondary),
            Some(&StrategyOutcome::Disabled)
        );
    }

    #[test]
    fn repeated_runs_yield_identical_content() {
        let fixture = fixture();
        let (ocr, _) = ocr_texts(&[(1, "stable"), (2, "output")]);
        let pipeline = ExtractionPipeline::with_backends(
            PipelineConfig::default(),
            backends(FakeText::Pages(Vec::new()), FakeText::Pages(Vec::new()), ocr, 2),
        );
        let availability = StrategyAvailability::all();

        let first = pipeline.extract(&fixture.document, &availability).unwrap();
        let second = pipeline.extract(&fixture.document, &availability).unwrap();

        assert_eq!(first.segments, second.segments);
    }

    #[test]
    fn missing_document_is_rejected_up_front() {
        let dir = tempdir().unwrap();
        let document = Document {
            path: dir.path().join("gone.pdf"),
            source: "gone.pdf".to_string(),
            checksum: String::new(),
        };

        let pipeline = ExtractionPipeline::new(PipelineConfig::default());
        let error = pipeline
            .extract(&document, &StrategyAvailability::none())
            .unwrap_err();

        assert!(matches!(error, ExtractionError::DocumentUnreadable { .. }));
    }
}
