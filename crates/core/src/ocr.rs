use crate::config::OcrSettings;
use crate::error::BackendError;
use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use std::process::Command;

/// Recognizes text in a single rendered page.
pub trait OcrEngine {
    fn name(&self) -> &'static str;

    fn recognize(
        &self,
        image: &DynamicImage,
        settings: &OcrSettings,
    ) -> Result<String, BackendError>;
}

/// The `tesseract` command line tool. Runs without a timeout.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        settings: &OcrSettings,
    ) -> Result<String, BackendError> {
        let input = tempfile::Builder::new()
            .prefix("pdf-qa-ocr-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&settings.languages)
            .arg("--psm")
            .arg(settings.page_segmentation_mode.to_string())
            .output()?;

        if !output.status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.name().to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Pushes every pixel away from the mean grey level by `factor`; 1.0 leaves
/// the image unchanged. The result is greyscale.
pub fn enhance_contrast(image: &DynamicImage, factor: f32) -> DynamicImage {
    let mut gray = image.to_luma8();
    let count = (gray.width() as u64) * (gray.height() as u64);
    if count == 0 {
        return DynamicImage::ImageLuma8(gray);
    }

    let sum: u64 = gray.pixels().map(|pixel| pixel.0[0] as u64).sum();
    let mean = (sum as f32 / count as f32).round();

    for pixel in gray.pixels_mut() {
        let value = pixel.0[0] as f32;
        pixel.0[0] = (mean + factor * (value - mean)).round().clamp(0.0, 255.0) as u8;
    }

    DynamicImage::ImageLuma8(gray)
}
