//! OCR pipeline types and errors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::ocr::{ExtractError, OcrError};
use crate::utils::{size_in_mb, DocumentType};

/// Errors that fail a whole pipeline run.
#[derive(Debug, Error)]
pub enum OcrPipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("No pages could be rendered out of {pages}: {last_error}")]
    NoPagesRendered { pages: u32, last_error: String },

    #[error("OCR engine failed for chunk starting at page {start_index}: {source}")]
    Ocr {
        start_index: u32,
        #[source]
        source: OcrError,
    },

    #[error("OCR task failed: {reason}")]
    TaskFailed { reason: String },

    #[error("OCR processing timed out after {limit_minutes} minutes ({:.1} minutes elapsed)", .elapsed.as_secs_f64() / 60.0)]
    Timeout { limit_minutes: u32, elapsed: Duration },

    #[error("Workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OcrPipelineError {
    /// Whether the document itself could not be parsed.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, OcrPipelineError::Extract(ExtractError::Unreadable(_)))
    }
}

/// A rendered page on disk, owned by the workspace it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Zero-based page index.
    pub page_index: u32,
    pub file_path: PathBuf,
}

/// A contiguous, ordered run of pages processed by one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkJob {
    pub start_index: u32,
    pub images: Vec<PageImage>,
}

/// Text produced by one chunk task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub start_index: u32,
    pub text: String,
}

/// Final output of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub used_ocr: bool,
}

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMethod {
    /// Embedded text was good enough.
    Direct,
    /// Pages were OCR'd sequentially on the calling thread.
    Ocr,
    /// Pages were OCR'd in chunks on the worker pool.
    ChunkedOcr,
    /// A large PDF whose sample looked clean, extracted page range by range.
    ChunkedExtract,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::Direct => "direct",
            ProcessingMethod::Ocr => "ocr",
            ProcessingMethod::ChunkedOcr => "chunked-ocr",
            ProcessingMethod::ChunkedExtract => "chunked-extract",
        }
    }

    pub fn used_ocr(&self) -> bool {
        matches!(self, ProcessingMethod::Ocr | ProcessingMethod::ChunkedOcr)
    }
}

impl std::fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything known about a finished extraction.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub extracted: ExtractedText,
    pub method: ProcessingMethod,
    pub page_count: u32,
    pub mime_type: String,
    pub document_type: DocumentType,
    /// Size of the input, if it could be read.
    pub file_size: Option<u64>,
}

impl PipelineOutput {
    /// Metadata handed to downstream indexing alongside the text.
    ///
    /// An unknown file size is reported as 0 MB.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("Detected-MIME-Type".to_string(), self.mime_type.clone());
        metadata.insert(
            "Document-Type".to_string(),
            self.document_type.as_str().to_string(),
        );
        metadata.insert("Page-Count".to_string(), self.page_count.to_string());
        metadata.insert(
            "File-Size-MB".to_string(),
            size_in_mb(self.file_size.unwrap_or(0)).to_string(),
        );
        metadata.insert(
            "Processing-Method".to_string(),
            self.method.as_str().to_string(),
        );
        metadata.insert(
            "Used-OCR".to_string(),
            self.extracted.used_ocr.to_string(),
        );
        metadata
    }
}

/// Shared page counter for progress reporting.
///
/// Tasks increment it; callers only read it. Advisory, never used for
/// correctness.
#[derive(Debug, Clone, Default)]
pub struct PageProgress {
    completed: Arc<AtomicU32>,
    total: Arc<AtomicU32>,
}

impl PageProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages processed so far.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Pages expected in the current run.
    pub fn total(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&self, total: u32) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record_page(&self) -> u32 {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }
}
