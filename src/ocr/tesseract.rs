//! Tesseract OCR engine adapter.
//!
//! Uses Tesseract via command-line. When the primary invocation fails because
//! orientation/script detection data is missing, the call is retried once
//! with fully automatic segmentation and no orientation detection.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use super::backend::{EngineFactory, OcrEngine, OcrError, OcrSettings, PageSegMode};
use super::tools::{check_binary, CommandOutcome, CommandRunner, SystemRunner};

const TESSERACT_BIN: &str = "tesseract";

/// Marker Tesseract prints when `osd.traineddata` cannot be loaded.
const OSD_DATA_MARKER: &str = "osd.traineddata";

/// Map a failed invocation's stderr onto a structured error.
fn classify_failure(stderr: &str) -> OcrError {
    if stderr.contains(OSD_DATA_MARKER) {
        OcrError::MissingOsdData(stderr.to_string())
    } else {
        OcrError::OcrFailed(format!("tesseract failed: {}", stderr))
    }
}

/// Tesseract engine instance. One per worker task.
pub struct TesseractEngine {
    settings: OcrSettings,
    page_seg_mode: PageSegMode,
    runner: Arc<dyn CommandRunner>,
}

impl TesseractEngine {
    pub fn new(settings: OcrSettings) -> Self {
        Self::with_runner(settings, Arc::new(SystemRunner))
    }

    /// Engine that invokes Tesseract through `runner`.
    pub fn with_runner(settings: OcrSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let page_seg_mode = settings.page_seg_mode;
        Self {
            settings,
            page_seg_mode,
            runner,
        }
    }

    /// Page segmentation mode the next call will start with.
    pub fn page_seg_mode(&self) -> PageSegMode {
        self.page_seg_mode
    }

    fn build_args(&self, image_path: &Path, psm: PageSegMode) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            image_path.as_os_str().to_owned(),
            "stdout".into(),
            "-l".into(),
            self.settings.language.clone().into(),
            "--psm".into(),
            psm.as_arg().into(),
            "--oem".into(),
            "1".into(),
            "-c".into(),
            "textord_max_iterations=5".into(),
        ];
        if let Some(ref tessdata) = self.settings.trained_data_path {
            args.push("--tessdata-dir".into());
            args.push(tessdata.as_os_str().to_owned());
        }
        args
    }

    fn run_tesseract(&self, image_path: &Path, psm: PageSegMode) -> Result<String, OcrError> {
        let args = self.build_args(image_path, psm);
        match self.runner.run(TESSERACT_BIN, &args)? {
            CommandOutcome::Success(stdout) => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            CommandOutcome::Failed(stderr) => Err(classify_failure(&stderr)),
            CommandOutcome::NotFound => Err(OcrError::EngineNotAvailable(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image_path: &Path) -> Result<String, OcrError> {
        match self.run_tesseract(image_path, self.page_seg_mode) {
            Err(OcrError::MissingOsdData(detail)) if self.page_seg_mode != PageSegMode::Auto => {
                warn!(
                    "OSD data unavailable ({}), retrying {} without orientation detection",
                    detail,
                    image_path.display()
                );
                // Later pages on this instance would hit the same failure.
                self.page_seg_mode = PageSegMode::Auto;
                self.run_tesseract(image_path, PageSegMode::Auto)
            }
            other => other,
        }
    }
}

/// Builds [`TesseractEngine`] instances after checking the installation.
#[derive(Debug, Clone)]
pub struct TesseractFactory {
    settings: OcrSettings,
}

impl TesseractFactory {
    pub fn new(settings: OcrSettings) -> Self {
        Self { settings }
    }

    /// Check if this engine can run (binary installed, trained data present).
    pub fn is_available(&self) -> bool {
        self.check_installation().is_ok()
    }

    fn check_installation(&self) -> Result<(), OcrError> {
        if !check_binary(TESSERACT_BIN) {
            return Err(OcrError::EngineNotAvailable(
                "Tesseract not installed. Install with: apt install tesseract-ocr".to_string(),
            ));
        }
        if let Some(ref tessdata) = self.settings.trained_data_path {
            if !tessdata.is_dir() {
                return Err(OcrError::EngineNotAvailable(format!(
                    "Trained data directory not found: {}",
                    tessdata.display()
                )));
            }
        }
        Ok(())
    }
}

impl EngineFactory for TesseractFactory {
    fn new_instance(&self) -> Result<Box<dyn OcrEngine>, OcrError> {
        self.check_installation()?;
        Ok(Box::new(TesseractEngine::new(self.settings.clone())))
    }
}
