//! Adaptive text extraction service.
//!
//! Tries the embedded text first and only falls back to rasterizing and
//! OCR'ing pages when the quick check says the text is unusable. Short
//! documents are OCR'd on a single blocking task; longer ones are split into
//! chunks and spread over the shared worker pool. PDFs above the large-file
//! threshold are judged from a sample of their first pages and, when clean,
//! extracted page range by page range.

mod pool;
mod scheduler;
mod types;
mod workspace;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::ocr::{
    EngineFactory, OcrSettings, PageRenderer, PdfTextExtractor, PopplerRenderer, QualityAnalyzer,
    RenderError, TesseractFactory, TextSource,
};
use crate::utils::{detect_mime_type, document_type, format_size, DocumentType};

pub use pool::{Submission, WorkerPool};
pub use scheduler::{combine, partition, OcrScheduler};
pub use types::{
    ChunkJob, ChunkResult, ExtractedText, OcrPipelineError, PageImage, PageProgress,
    PipelineOutput, ProcessingMethod,
};
pub use workspace::{scoped_workspace, Workspace};

/// Size of the file at `path`, or `None` (logged) when it cannot be read.
async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            warn!("Could not read size of {}: {}", path.display(), e);
            None
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, OcrPipelineError>
where
    F: FnOnce() -> Result<T, OcrPipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| OcrPipelineError::TaskFailed {
            reason: format!("extraction task failed: {}", e),
        })?
}

/// What is known about a document before its text is produced.
struct Document {
    mime_type: String,
    document_type: DocumentType,
    page_count: u32,
    file_size: Option<u64>,
}

impl Document {
    fn finish(self, text: String, method: ProcessingMethod) -> PipelineOutput {
        PipelineOutput {
            extracted: ExtractedText {
                text,
                used_ocr: method.used_ocr(),
            },
            method,
            page_count: self.page_count,
            mime_type: self.mime_type,
            document_type: self.document_type,
            file_size: self.file_size,
        }
    }
}

/// Result of the blocking preparation step.
enum Plan {
    Done(PipelineOutput),
    Ocr {
        document: Document,
        workspace: Workspace,
        pages: Vec<PageImage>,
        method: ProcessingMethod,
    },
}

/// Extraction pipeline over injectable text, render and OCR capabilities.
///
/// Cheap to clone; clones share the worker pool.
#[derive(Clone)]
pub struct OcrPipeline {
    config: Arc<ExtractionConfig>,
    analyzer: QualityAnalyzer,
    text_source: Arc<dyn TextSource>,
    renderer: Arc<dyn PageRenderer>,
    engines: Arc<dyn EngineFactory>,
    scheduler: OcrScheduler,
}

impl OcrPipeline {
    /// Build a pipeline backed by Poppler and Tesseract.
    pub fn new(config: ExtractionConfig) -> Result<Self, OcrPipelineError> {
        let engines = Arc::new(TesseractFactory::new(OcrSettings::from_config(&config)));
        Self::with_components(
            config,
            Arc::new(PdfTextExtractor::new()),
            Arc::new(PopplerRenderer::new()),
            engines,
        )
    }

    /// Build a pipeline from explicit collaborators.
    pub fn with_components(
        config: ExtractionConfig,
        text_source: Arc<dyn TextSource>,
        renderer: Arc<dyn PageRenderer>,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<Self, OcrPipelineError> {
        config.validate()?;

        let pool = WorkerPool::new(
            "ocr-worker",
            config.max_threads as usize,
            config.queue_capacity(),
        );

        let scheduler = OcrScheduler::new(
            Arc::new(pool),
            Arc::clone(&engines),
            config.chunk_size,
            config.timeout_minutes,
        );

        Ok(Self {
            analyzer: QualityAnalyzer::from_config(&config),
            config: Arc::new(config),
            text_source,
            renderer,
            engines,
            scheduler,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract text from the document at `path`.
    ///
    /// A given `page_count` is checked against the document; the document's
    /// own count wins when they disagree.
    pub async fn extract(
        &self,
        path: &Path,
        page_count: Option<u32>,
    ) -> Result<ExtractedText, OcrPipelineError> {
        self.extract_with_progress(path, page_count, PageProgress::new())
            .await
            .map(|output| output.extracted)
    }

    /// Extract text and build the metadata map recorded alongside it.
    pub async fn extract_with_metadata(
        &self,
        path: &Path,
        page_count: Option<u32>,
    ) -> Result<(ExtractedText, BTreeMap<String, String>), OcrPipelineError> {
        let output = self
            .extract_with_progress(path, page_count, PageProgress::new())
            .await?;
        let metadata = output.metadata();
        Ok((output.extracted, metadata))
    }

    /// Extract text, reporting page progress to `progress`.
    ///
    /// Detection, text extraction and rendering run on a blocking task; OCR
    /// runs inline for short documents and on the worker pool otherwise. The
    /// workspace holding rendered pages is removed before this returns.
    pub async fn extract_with_progress(
        &self,
        path: &Path,
        page_count: Option<u32>,
        progress: PageProgress,
    ) -> Result<PipelineOutput, OcrPipelineError> {
        let file_size = file_size(path).await;

        let plan = {
            let pipeline = self.clone();
            let path = path.to_path_buf();
            let progress = progress.clone();
            run_blocking(move || pipeline.plan(&path, page_count, file_size, &progress)).await?
        };

        let (document, workspace, pages, method) = match plan {
            Plan::Done(output) => return Ok(output),
            Plan::Ocr {
                document,
                workspace,
                pages,
                method,
            } => (document, workspace, pages, method),
        };

        let rendered = pages.len() as u32;
        progress.start(rendered);

        let text = if method == ProcessingMethod::Ocr {
            let scheduler = self.scheduler.clone();
            let progress = progress.clone();
            run_blocking(move || scheduler.process_inline(pages, rendered, &progress)).await?
        } else {
            self.scheduler.process(pages, rendered, &progress).await?
        };

        drop(workspace);
        Ok(document.finish(text, method))
    }

    /// Decide how to produce the text, doing everything up to OCR.
    fn plan(
        &self,
        path: &Path,
        supplied_pages: Option<u32>,
        file_size: Option<u64>,
        progress: &PageProgress,
    ) -> Result<Plan, OcrPipelineError> {
        let mime_type = detect_mime_type(path);
        let doc_type = document_type(&mime_type);
        debug!("Detected {} ({}) for {}", mime_type, doc_type, path.display());

        if doc_type == DocumentType::Image {
            let text = self.recognize_image(path, progress)?;
            let document = Document {
                mime_type,
                document_type: doc_type,
                page_count: 1,
                file_size,
            };
            return Ok(Plan::Done(document.finish(text, ProcessingMethod::Ocr)));
        }

        let page_count = self.resolve_page_count(path, supplied_pages)?;
        let document = Document {
            mime_type,
            document_type: doc_type,
            page_count,
            file_size,
        };

        if file_size.is_some_and(|size| self.config.is_large_file(size)) {
            return self.plan_large(path, document);
        }

        let text = self.text_source.extract_embedded_text(path)?;
        let metrics = self.analyzer.analyze(&text, page_count);
        debug!(
            "Quick check for {}: density={:.3}, quality={:.3}, meaningful={}",
            path.display(),
            metrics.density,
            metrics.quality,
            metrics.has_meaningful_text
        );

        if !self.analyzer.should_use_ocr(&metrics, &text) {
            info!(
                "Using embedded text for {} ({} pages)",
                path.display(),
                page_count
            );
            return Ok(Plan::Done(document.finish(text, ProcessingMethod::Direct)));
        }

        info!(
            "Embedded text insufficient for {}, running OCR on {} pages",
            path.display(),
            page_count
        );

        let method = if page_count <= self.config.ocr_page_threshold {
            ProcessingMethod::Ocr
        } else {
            ProcessingMethod::ChunkedOcr
        };
        self.plan_ocr(path, document, method)
    }

    /// Page count from the document, cross-checked against the caller's.
    fn resolve_page_count(
        &self,
        path: &Path,
        supplied: Option<u32>,
    ) -> Result<u32, OcrPipelineError> {
        let actual = self.text_source.page_count(path)?;
        if let Some(supplied) = supplied.filter(|&n| n != actual) {
            warn!(
                "Ignoring page count {} for {}: document has {} pages",
                supplied,
                path.display(),
                actual
            );
        }
        Ok(actual)
    }

    /// Judge a large PDF by its first pages instead of a full extraction.
    fn plan_large(&self, path: &Path, document: Document) -> Result<Plan, OcrPipelineError> {
        let sample_pages = self.config.sample_pages.min(document.page_count);
        let sample = if sample_pages == 0 {
            String::new()
        } else {
            self.text_source.extract_pages(path, 1, sample_pages)?
        };
        let metrics = self.analyzer.analyze(&sample, sample_pages);

        info!(
            "Large PDF {} ({}), sampled first {} of {} pages: density={:.3}, quality={:.3}",
            path.display(),
            format_size(document.file_size.unwrap_or(0)),
            sample_pages,
            document.page_count,
            metrics.density,
            metrics.quality
        );

        if self.analyzer.should_use_ocr(&metrics, &sample) {
            return self.plan_ocr(path, document, ProcessingMethod::ChunkedOcr);
        }

        let text = self.extract_page_ranges(path, document.page_count)?;
        Ok(Plan::Done(
            document.finish(text, ProcessingMethod::ChunkedExtract),
        ))
    }

    /// Embedded text of the whole document, `chunk_size` pages at a time.
    fn extract_page_ranges(
        &self,
        path: &Path,
        page_count: u32,
    ) -> Result<String, OcrPipelineError> {
        let step = self.config.chunk_size.max(1);
        let mut texts = Vec::new();
        let mut first = 1u32;

        while first <= page_count {
            let last = first.saturating_add(step - 1).min(page_count);
            let text = self.text_source.extract_pages(path, first, last)?;
            debug!("Extracted pages {}-{} of {}", first, last, page_count);
            if !text.trim().is_empty() {
                texts.push(text);
            }
            match last.checked_add(1) {
                Some(next) => first = next,
                None => break,
            }
        }

        Ok(texts.join("\n"))
    }

    fn plan_ocr(
        &self,
        path: &Path,
        document: Document,
        method: ProcessingMethod,
    ) -> Result<Plan, OcrPipelineError> {
        let workspace = scoped_workspace(&self.config.workspace_parent())
            .map_err(OcrPipelineError::Workspace)?;
        let pages = self.rasterize(path, document.page_count, &workspace)?;
        Ok(Plan::Ocr {
            document,
            workspace,
            pages,
            method,
        })
    }

    /// Render every page into `workspace`, skipping pages that fail.
    fn rasterize(
        &self,
        path: &Path,
        page_count: u32,
        workspace: &Workspace,
    ) -> Result<Vec<PageImage>, OcrPipelineError> {
        let mut pages = Vec::new();
        let mut last_error: Option<String> = None;

        for page_index in 0..page_count {
            let file_path = workspace.page_path(page_index);
            let rendered = self
                .renderer
                .render_page(path, page_index, self.config.dpi, self.config.render_mode)
                .and_then(|raster| raster.save_png(&file_path));

            match rendered {
                Ok(()) => pages.push(PageImage {
                    page_index,
                    file_path,
                }),
                Err(RenderError::ToolNotFound(tool)) => {
                    return Err(OcrPipelineError::NoPagesRendered {
                        pages: page_count,
                        last_error: format!("Renderer not available: {}", tool),
                    });
                }
                Err(e) => {
                    warn!("Skipping page {}: {}", page_index + 1, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        if pages.is_empty() {
            return Err(OcrPipelineError::NoPagesRendered {
                pages: page_count,
                last_error: last_error.unwrap_or_else(|| "document has no pages".to_string()),
            });
        }

        debug!("Rendered {} of {} pages", pages.len(), page_count);
        Ok(pages)
    }

    /// OCR an image file as a single page.
    fn recognize_image(
        &self,
        path: &Path,
        progress: &PageProgress,
    ) -> Result<String, OcrPipelineError> {
        progress.start(1);
        let ocr_error = |source| OcrPipelineError::Ocr {
            start_index: 0,
            source,
        };

        let mut engine = self.engines.new_instance().map_err(ocr_error)?;
        let text = engine.recognize(path).map_err(ocr_error)?;
        progress.record_page();
        info!("Recognized image {}", path.display());
        Ok(text.trim_end().to_string())
    }
}
