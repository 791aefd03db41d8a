//! Service layer for doctext.
//!
//! Domain logic separated from UI concerns so it can be driven by the CLI
//! or embedded in another document-processing service.

pub mod ocr;

pub use ocr::{ExtractedText, OcrPipeline, OcrPipelineError, PageProgress, PipelineOutput};
