//! OCR engine abstraction.
//!
//! Engine instances hold per-invocation state and are never shared between
//! concurrent callers. Workers obtain their own instance from an
//! [`EngineFactory`], which is the only piece shared across threads.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ExtractionConfig;

/// Errors from OCR engines.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineNotAvailable(String),

    /// Orientation/script detection data is not installed.
    #[error("Missing orientation and script detection data: {0}")]
    MissingOsdData(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tesseract page segmentation modes used by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// Automatic page segmentation with orientation and script detection.
    AutoOsd,
    /// Fully automatic page segmentation, no orientation detection.
    Auto,
}

impl PageSegMode {
    pub fn as_arg(&self) -> &'static str {
        match self {
            PageSegMode::AutoOsd => "1",
            PageSegMode::Auto => "3",
        }
    }
}

/// Engine-specific settings shared by every instance a factory creates.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    /// Language specification (e.g. "eng+vie").
    pub language: String,
    /// Trained data directory, if not the engine default.
    pub trained_data_path: Option<PathBuf>,
    /// Initial page segmentation mode.
    pub page_seg_mode: PageSegMode,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

impl OcrSettings {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            language: config.ocr_language.clone(),
            trained_data_path: config.trained_data_path.clone(),
            page_seg_mode: PageSegMode::AutoOsd,
        }
    }
}

/// A single, non-shared OCR engine instance.
pub trait OcrEngine {
    /// Recognize the text in an image file.
    fn recognize(&mut self, image_path: &Path) -> Result<String, OcrError>;
}

/// Creates engine instances; shared across worker threads.
pub trait EngineFactory: Send + Sync {
    /// Construct a fresh engine. Construction failure is fatal for the task.
    fn new_instance(&self) -> Result<Box<dyn OcrEngine>, OcrError>;
}
