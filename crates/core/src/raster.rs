use crate::error::BackendError;
use image::DynamicImage;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const PAGE_PREFIX: &str = "page";

/// One rendered page, held in memory until OCR has run over it.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub number: u32,
    pub image: DynamicImage,
}

/// Turns every page of a PDF into a pixel image, ordered by page number.
pub trait Rasterizer {
    fn name(&self) -> &'static str;

    fn rasterize(&self, path: &Path) -> Result<Vec<RasterPage>, BackendError>;
}

/// MuPDF's `mutool draw`, rendering at a fixed zoom.
#[derive(Debug, Clone)]
pub struct MutoolRasterizer {
    binary: PathBuf,
    dpi: u32,
}

impl MutoolRasterizer {
    pub fn new(binary: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            dpi,
        }
    }
}

impl Rasterizer for MutoolRasterizer {
    fn name(&self) -> &'static str {
        "mutool"
    }

    fn rasterize(&self, path: &Path) -> Result<Vec<RasterPage>, BackendError> {
        let workdir = tempfile::tempdir()?;
        let pattern = workdir.path().join(format!("{PAGE_PREFIX}-%d.png"));

        let output = Command::new(&self.binary)
            .arg("draw")
            .arg("-q")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-o")
            .arg(&pattern)
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.name().to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        collect_rendered_pages(workdir.path(), self.name())
    }
}

/// Poppler's `pdftoppm`, rendering at a fixed dpi.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            dpi,
        }
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn rasterize(&self, path: &Path) -> Result<Vec<RasterPage>, BackendError> {
        let workdir = tempfile::tempdir()?;
        let prefix = workdir.path().join(PAGE_PREFIX);

        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(path)
            .arg(&prefix)
            .output()?;

        if !output.status.success() {
            return Err(BackendError::ToolFailed {
                tool: self.name().to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        collect_rendered_pages(workdir.path(), self.name())
    }
}

/// Loads `page-N.png` files from `dir`. pdftoppm zero-pads N depending on the
/// page count, so ordering goes by the parsed number, not the file name.
fn collect_rendered_pages(dir: &Path, tool: &str) -> Result<Vec<RasterPage>, BackendError> {
    let file_re = Regex::new(&format!(r"^{PAGE_PREFIX}-(\d+)\.png$"))
        .map_err(|error| BackendError::ToolFailed {
            tool: tool.to_string(),
            details: error.to_string(),
        })?;

    let mut numbered = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(number) = file_re
            .captures(name)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        numbered.push((number, entry.path()));
    }

    if numbered.is_empty() {
        return Err(BackendError::NoOutput(tool.to_string()));
    }

    numbered.sort_by_key(|(number, _)| *number);
    debug!(tool, pages = numbered.len(), "pages rasterized");

    numbered
        .into_iter()
        .map(|(number, path)| {
            let image = image::open(&path)?;
            Ok::<_, BackendError>(RasterPage { number, image })
        })
        .collect()
}
