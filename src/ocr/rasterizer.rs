//! Page rasterization via Poppler's pdftoppm.
//!
//! Each call renders exactly one page into memory. The caller owns the
//! returned raster and drops it once written, so buffers never accumulate
//! across pages.

use std::fmt;
use std::path::Path;
use std::process::Command;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tools::{classify_output, CommandOutcome};

/// Luma cut-off for binary rendering.
const BINARY_THRESHOLD: u8 = 128;

/// Rendering color mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Full RGB rendering.
    #[default]
    #[serde(alias = "rgb", alias = "RGB")]
    Color,
    /// Thresholded monochrome.
    #[serde(alias = "BINARY", alias = "mono")]
    Binary,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Color => write!(f, "color"),
            RenderMode::Binary => write!(f, "binary"),
        }
    }
}

/// Errors from rendering a single page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer not available: {0}")]
    ToolNotFound(String),

    #[error("Failed to render page {page}: {reason}")]
    RenderFailed { page: u32, reason: String },

    #[error("Failed to decode page {page}: {source}")]
    Decode {
        page: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write page {page}: {source}")]
    Write {
        page: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One rendered page held in memory.
pub struct RasterImage {
    /// Zero-based page index.
    pub page_index: u32,
    pub image: DynamicImage,
}

impl RasterImage {
    /// Encode the raster as PNG at `path`.
    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| RenderError::Write {
                page: self.page_index,
                source,
            })
    }
}

/// Renders single document pages to raster images.
pub trait PageRenderer: Send + Sync {
    fn render_page(
        &self,
        path: &Path,
        page_index: u32,
        dpi: f32,
        mode: RenderMode,
    ) -> Result<RasterImage, RenderError>;
}

/// Threshold a grayscale rendering to pure black and white.
pub fn binarize(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if pixel[0] >= BINARY_THRESHOLD { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    DynamicImage::ImageLuma8(out)
}

/// Page renderer backed by pdftoppm.
#[derive(Debug, Clone, Default)]
pub struct PopplerRenderer;

impl PopplerRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRenderer for PopplerRenderer {
    fn render_page(
        &self,
        path: &Path,
        page_index: u32,
        dpi: f32,
        mode: RenderMode,
    ) -> Result<RasterImage, RenderError> {
        // pdftoppm pages are 1-based
        let page = (page_index + 1).to_string();
        let resolution = format!("{}", dpi.round() as u32);

        let mut cmd = Command::new("pdftoppm");
        cmd.args(["-png", "-singlefile", "-r", &resolution, "-f", &page, "-l", &page]);
        if mode == RenderMode::Binary {
            cmd.arg("-gray");
        }
        cmd.arg(path);

        let png = match classify_output(cmd.output())? {
            CommandOutcome::Success(stdout) if !stdout.is_empty() => stdout,
            CommandOutcome::Success(_) => {
                return Err(RenderError::RenderFailed {
                    page: page_index,
                    reason: "pdftoppm produced no output".to_string(),
                })
            }
            CommandOutcome::Failed(stderr) => {
                return Err(RenderError::RenderFailed {
                    page: page_index,
                    reason: stderr,
                })
            }
            CommandOutcome::NotFound => {
                return Err(RenderError::ToolNotFound(
                    "pdftoppm (install poppler-utils)".to_string(),
                ))
            }
        };

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).map_err(
            |source| RenderError::Decode {
                page: page_index,
                source,
            },
        )?;
        drop(png);

        let image = match mode {
            RenderMode::Color => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            RenderMode::Binary => binarize(&decoded),
        };

        Ok(RasterImage { page_index, image })
    }
}
