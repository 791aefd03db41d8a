//! Text extraction and OCR building blocks.
//!
//! - pdftotext / pdfinfo (Poppler) for embedded text and page counts
//! - pdftoppm (Poppler) for rendering single pages
//! - Tesseract for recognizing rendered pages
//! - quality heuristics deciding whether OCR is needed at all
//!
//! Each external capability sits behind a trait so the pipeline in
//! `services::ocr` can be driven with substitutes.

mod backend;
mod extractor;
mod quality;
mod rasterizer;
mod tesseract;
pub mod tools;

pub use backend::{EngineFactory, OcrEngine, OcrError, OcrSettings, PageSegMode};
pub use extractor::{ExtractError, PdfTextExtractor, TextSource};
pub use quality::{has_meaningful_text, quality, QualityAnalyzer, TextMetrics};
pub use rasterizer::{binarize, PageRenderer, PopplerRenderer, RasterImage, RenderError, RenderMode};
pub use tesseract::{TesseractEngine, TesseractFactory};
