//! doctext - adaptive document text extraction.
//!
//! Uses a document's embedded text when it is good enough and falls back to
//! rasterizing pages and running OCR across a bounded worker pool when it is
//! not.

pub mod cli;
pub mod config;
pub mod ocr;
pub mod services;
pub mod utils;

pub use config::{Config, ConfigError, ExtractionConfig};
pub use services::{ExtractedText, OcrPipeline, OcrPipelineError, PageProgress, PipelineOutput};
