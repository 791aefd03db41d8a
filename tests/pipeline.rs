//! Pipeline Tests
//!
//! Drives `OcrPipeline` end to end with in-process text, render and OCR
//! collaborators so page order, failure isolation, timeouts and workspace
//! cleanup can be checked without Poppler or Tesseract installed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::{DynamicImage, RgbImage};

use doctext::ocr::{
    EngineFactory, ExtractError, OcrEngine, OcrError, PageRenderer, RasterImage, RenderError,
    RenderMode, TextSource,
};
use doctext::services::ocr::ProcessingMethod;
use doctext::{ExtractionConfig, OcrPipeline, OcrPipelineError, PageProgress};

// Fakes

struct FakeText {
    pages: Vec<String>,
    unreadable: bool,
    calls: AtomicUsize,
    ranges: Mutex<Vec<(u32, u32)>>,
}

impl FakeText {
    /// All of `text` on the first of `pages` pages.
    fn new(text: &str, pages: u32) -> Arc<Self> {
        let mut texts = vec![String::new(); pages as usize];
        if let Some(first) = texts.first_mut() {
            *first = text.to_string();
        }
        Self::paged(texts)
    }

    fn paged(pages: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            unreadable: false,
            calls: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        })
    }

    fn unreadable() -> Arc<Self> {
        Arc::new(Self {
            pages: Vec::new(),
            unreadable: true,
            calls: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        })
    }

    fn ranges(&self) -> Vec<(u32, u32)> {
        self.ranges.lock().unwrap().clone()
    }

    fn check_readable(&self) -> Result<(), ExtractError> {
        if self.unreadable {
            return Err(ExtractError::Unreadable("pdftotext failed: Syntax Error".to_string()));
        }
        Ok(())
    }

    fn join(pages: &[String]) -> String {
        pages
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TextSource for FakeText {
    fn extract_embedded_text(&self, _path: &Path) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_readable()?;
        Ok(Self::join(&self.pages))
    }

    fn extract_pages(&self, _path: &Path, first: u32, last: u32) -> Result<String, ExtractError> {
        self.ranges.lock().unwrap().push((first, last));
        self.check_readable()?;
        let end = (last as usize).min(self.pages.len());
        let start = (first as usize).saturating_sub(1).min(end);
        Ok(Self::join(&self.pages[start..end]))
    }

    fn page_count(&self, _path: &Path) -> Result<u32, ExtractError> {
        Ok(self.pages.len() as u32)
    }
}

#[derive(Default)]
struct FakeRenderer {
    fail_pages: HashSet<u32>,
    calls: AtomicUsize,
}

impl FakeRenderer {
    fn failing(pages: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Arc::new(Self {
            fail_pages: pages.into_iter().collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl PageRenderer for FakeRenderer {
    fn render_page(
        &self,
        _path: &Path,
        page_index: u32,
        _dpi: f32,
        _mode: RenderMode,
    ) -> Result<RasterImage, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pages.contains(&page_index) {
            return Err(RenderError::RenderFailed {
                page: page_index,
                reason: "broken page stream".to_string(),
            });
        }
        Ok(RasterImage {
            page_index,
            image: DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
        })
    }
}

fn page_index(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("page_")?
        .parse()
        .ok()
}

struct FakeEngine {
    fail_on: Option<u32>,
    slow_first_pages: Option<u32>,
}

impl OcrEngine for FakeEngine {
    fn recognize(&mut self, image_path: &Path) -> Result<String, OcrError> {
        let Some(index) = page_index(image_path) else {
            return Ok("text of image\n".to_string());
        };
        if let Some(total) = self.slow_first_pages {
            // Earlier pages take longer so later chunks finish first
            thread::sleep(Duration::from_millis(u64::from(total.saturating_sub(index)) * 3));
        }
        if Some(index) == self.fail_on {
            return Err(OcrError::OcrFailed(format!("injected failure on page {}", index)));
        }
        Ok(format!("text of page {}\n", index))
    }
}

#[derive(Default)]
struct FakeEngines {
    fail_on: Option<u32>,
    slow_first_pages: Option<u32>,
    broken: bool,
    instances: AtomicUsize,
}

impl FakeEngines {
    fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }
}

impl EngineFactory for FakeEngines {
    fn new_instance(&self) -> Result<Box<dyn OcrEngine>, OcrError> {
        if self.broken {
            return Err(OcrError::EngineNotAvailable(
                "Tesseract not installed".to_string(),
            ));
        }
        self.instances.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            fail_on: self.fail_on,
            slow_first_pages: self.slow_first_pages,
        }))
    }
}

// Helpers

struct Fixture {
    _dir: tempfile::TempDir,
    document: PathBuf,
    workspaces: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("document.pdf");
        std::fs::write(&document, b"%PDF-1.4\n%fixture\n").unwrap();
        let workspaces = dir.path().join("work");
        std::fs::create_dir(&workspaces).unwrap();
        Self {
            _dir: dir,
            document,
            workspaces,
        }
    }

    fn config(&self) -> ExtractionConfig {
        ExtractionConfig {
            temp_dir: Some(self.workspaces.clone()),
            ..ExtractionConfig::default()
        }
    }

    fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.workspaces).unwrap().count()
    }
}

fn pipeline(
    config: ExtractionConfig,
    text: Arc<FakeText>,
    renderer: Arc<FakeRenderer>,
    engines: Arc<FakeEngines>,
) -> OcrPipeline {
    OcrPipeline::with_components(config, text, renderer, engines).unwrap()
}

fn expected_pages(n: u32, skip: &[u32]) -> String {
    (0..n)
        .filter(|i| !skip.contains(i))
        .map(|i| format!("text of page {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn prose(len: usize) -> String {
    let sentence = "The committee reviewed the annual budget and approved the proposal. ";
    sentence.repeat(len / sentence.len() + 1)[..len].to_string()
}

#[tokio::test]
async fn test_clean_text_never_touches_rasterizer_or_engine() {
    let fx = Fixture::new();
    let body = prose(3000);
    let text = FakeText::new(&body, 3);
    let renderer = Arc::new(FakeRenderer::default());
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(fx.config(), text.clone(), renderer.clone(), engines.clone());

    let (extracted, metadata) = p.extract_with_metadata(&fx.document, Some(3)).await.unwrap();

    assert!(!extracted.used_ocr);
    assert_eq!(extracted.text, body);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.instances(), 0);
    assert_eq!(metadata["Processing-Method"], "direct");
    assert_eq!(metadata["Used-OCR"], "false");
    assert_eq!(metadata["Detected-MIME-Type"], "application/pdf");
    assert_eq!(metadata["Document-Type"], "PDF");
    assert_eq!(metadata["Page-Count"], "3");
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_short_text_goes_to_sequential_ocr() {
    let fx = Fixture::new();
    let text = FakeText::new("Hello world this is a real sentence.", 3);
    let renderer = Arc::new(FakeRenderer::default());
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(fx.config(), text, renderer.clone(), engines.clone());

    let progress = PageProgress::new();
    let output = p
        .extract_with_progress(&fx.document, None, progress.clone())
        .await
        .unwrap();

    assert!(output.extracted.used_ocr);
    assert_eq!(output.method, ProcessingMethod::Ocr);
    assert_eq!(output.page_count, 3);
    assert_eq!(output.extracted.text, expected_pages(3, &[]));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(engines.instances(), 1);
    assert_eq!(progress.completed(), 3);
    assert_eq!(progress.total(), 3);
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_single_page_failure_is_isolated() {
    let fx = Fixture::new();
    let engines = Arc::new(FakeEngines {
        fail_on: Some(12),
        ..FakeEngines::default()
    });
    let p = pipeline(
        fx.config(),
        FakeText::new("", 25),
        Arc::new(FakeRenderer::default()),
        engines.clone(),
    );

    let first = p.extract(&fx.document, Some(25)).await.unwrap();
    let second = p.extract(&fx.document, Some(25)).await.unwrap();

    assert!(first.used_ocr);
    assert_eq!(first.text, expected_pages(25, &[12]));
    assert!(!first.text.contains("text of page 12"));
    assert_eq!(first, second);
    // 3 chunks (10, 10, 5) per run, one engine each
    assert_eq!(engines.instances(), 6);
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_output_order_ignores_completion_order() {
    let fx = Fixture::new();
    let config = ExtractionConfig {
        chunk_size: 3,
        ..fx.config()
    };
    let engines = Arc::new(FakeEngines {
        slow_first_pages: Some(30),
        ..FakeEngines::default()
    });
    let p = pipeline(
        config,
        FakeText::new("", 30),
        Arc::new(FakeRenderer::default()),
        engines,
    );

    let output = p
        .extract_with_progress(&fx.document, Some(30), PageProgress::new())
        .await
        .unwrap();

    assert_eq!(output.method, ProcessingMethod::ChunkedOcr);
    assert_eq!(output.extracted.text, expected_pages(30, &[]));
}

#[tokio::test]
async fn test_zero_timeout_fails_and_cleans_up() {
    for pages in [25, 2] {
        let fx = Fixture::new();
        let config = ExtractionConfig {
            timeout_minutes: 0,
            ..fx.config()
        };
        let p = pipeline(
            config,
            FakeText::new("", pages),
            Arc::new(FakeRenderer::default()),
            Arc::new(FakeEngines::default()),
        );

        let err = p.extract(&fx.document, Some(pages)).await.unwrap_err();
        assert!(
            matches!(err, OcrPipelineError::Timeout { limit_minutes: 0, .. }),
            "unexpected error for {} pages: {:?}",
            pages,
            err
        );
        assert_eq!(fx.leftover_workspaces(), 0);
    }
}

#[tokio::test]
async fn test_failed_renders_are_skipped() {
    let fx = Fixture::new();
    let renderer = FakeRenderer::failing([0, 7]);
    let p = pipeline(
        fx.config(),
        FakeText::new("", 8),
        renderer.clone(),
        Arc::new(FakeEngines::default()),
    );

    let extracted = p.extract(&fx.document, Some(8)).await.unwrap();

    assert_eq!(renderer.calls.load(Ordering::SeqCst), 8);
    assert_eq!(extracted.text, expected_pages(8, &[0, 7]));
}

#[tokio::test]
async fn test_no_pages_rendered_is_fatal() {
    let fx = Fixture::new();
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(
        fx.config(),
        FakeText::new("", 4),
        FakeRenderer::failing(0..4),
        engines.clone(),
    );

    let err = p.extract(&fx.document, Some(4)).await.unwrap_err();

    match err {
        OcrPipelineError::NoPagesRendered { pages, last_error } => {
            assert_eq!(pages, 4);
            assert!(last_error.contains("broken page stream"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engines.instances(), 0);
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_unreadable_document_is_fatal_without_ocr() {
    let fx = Fixture::new();
    let renderer = Arc::new(FakeRenderer::default());
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(
        fx.config(),
        FakeText::unreadable(),
        renderer.clone(),
        engines.clone(),
    );

    let err = p.extract(&fx.document, Some(3)).await.unwrap_err();

    assert!(err.is_unreadable());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.instances(), 0);
}

#[tokio::test]
async fn test_engine_construction_failure_discards_results() {
    let fx = Fixture::new();
    let engines = Arc::new(FakeEngines {
        broken: true,
        ..FakeEngines::default()
    });
    let p = pipeline(
        fx.config(),
        FakeText::new("", 12),
        Arc::new(FakeRenderer::default()),
        engines,
    );

    let err = p.extract(&fx.document, Some(12)).await.unwrap_err();

    assert!(matches!(
        err,
        OcrPipelineError::Ocr {
            source: OcrError::EngineNotAvailable(_),
            ..
        }
    ));
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_image_input_is_recognized_directly() {
    let fx = Fixture::new();
    let image_path = fx.workspaces.parent().unwrap().join("scan.png");
    DynamicImage::ImageRgb8(RgbImage::new(4, 4))
        .save_with_format(&image_path, image::ImageFormat::Png)
        .unwrap();

    let text = FakeText::new("", 1);
    let renderer = Arc::new(FakeRenderer::default());
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(fx.config(), text.clone(), renderer.clone(), engines.clone());

    let (extracted, metadata) = p.extract_with_metadata(&image_path, None).await.unwrap();

    assert!(extracted.used_ocr);
    assert_eq!(extracted.text, "text of image");
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.instances(), 1);
    assert_eq!(metadata["Document-Type"], "IMAGE");
    assert_eq!(metadata["Detected-MIME-Type"], "image/png");
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = ExtractionConfig {
        chunk_size: 0,
        ..ExtractionConfig::default()
    };
    let result = OcrPipeline::with_components(
        config,
        FakeText::new("", 1),
        Arc::new(FakeRenderer::default()),
        Arc::new(FakeEngines::default()),
    );
    assert!(matches!(result, Err(OcrPipelineError::Config(_))));
}

#[tokio::test]
async fn test_supplied_page_count_is_checked_against_document() {
    let fx = Fixture::new();
    let renderer = Arc::new(FakeRenderer::default());
    let p = pipeline(
        fx.config(),
        FakeText::new("", 3),
        renderer.clone(),
        Arc::new(FakeEngines::default()),
    );

    let output = p
        .extract_with_progress(&fx.document, Some(u32::MAX), PageProgress::new())
        .await
        .unwrap();

    assert_eq!(output.page_count, 3);
    assert_eq!(output.method, ProcessingMethod::Ocr);
    assert_eq!(output.extracted.text, expected_pages(3, &[]));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_large_clean_pdf_is_extracted_by_page_range() {
    let fx = Fixture::new();
    let config = ExtractionConfig {
        large_size_threshold_mb: 0,
        sample_pages: 2,
        chunk_size: 2,
        ..fx.config()
    };
    let pages: Vec<String> = (0..5).map(|_| prose(600)).collect();
    let text = FakeText::paged(pages.clone());
    let renderer = Arc::new(FakeRenderer::default());
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(config, text.clone(), renderer.clone(), engines.clone());

    let (extracted, metadata) = p.extract_with_metadata(&fx.document, None).await.unwrap();

    assert!(!extracted.used_ocr);
    assert_eq!(extracted.text, pages.join("\n"));
    // Sample of the first two pages, then the whole document two pages at a time
    assert_eq!(text.ranges(), vec![(1, 2), (1, 2), (3, 4), (5, 5)]);
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engines.instances(), 0);
    assert_eq!(metadata["Processing-Method"], "chunked-extract");
    assert_eq!(metadata["Used-OCR"], "false");
    assert_eq!(metadata["Page-Count"], "5");
}

#[tokio::test]
async fn test_large_scanned_pdf_goes_to_chunked_ocr() {
    let fx = Fixture::new();
    let config = ExtractionConfig {
        large_size_threshold_mb: 0,
        ..fx.config()
    };
    let text = FakeText::new("", 3);
    let engines = Arc::new(FakeEngines::default());
    let p = pipeline(
        config,
        text.clone(),
        Arc::new(FakeRenderer::default()),
        engines.clone(),
    );

    let (extracted, metadata) = p.extract_with_metadata(&fx.document, Some(3)).await.unwrap();

    // Below the sequential page threshold, but large files always use chunks
    assert!(extracted.used_ocr);
    assert_eq!(extracted.text, expected_pages(3, &[]));
    assert_eq!(metadata["Processing-Method"], "chunked-ocr");
    // Sample is capped at the document's page count
    assert_eq!(text.ranges(), vec![(1, 3)]);
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_unreadable_file_size_is_reported_as_zero() {
    let fx = Fixture::new();
    let missing = fx.workspaces.parent().unwrap().join("moved-away.pdf");
    let config = ExtractionConfig {
        large_size_threshold_mb: 0,
        ..fx.config()
    };
    let body = prose(3000);
    let p = pipeline(
        config,
        FakeText::new(&body, 3),
        Arc::new(FakeRenderer::default()),
        Arc::new(FakeEngines::default()),
    );

    let (extracted, metadata) = p.extract_with_metadata(&missing, None).await.unwrap();

    // Unknown size never selects the large-file path
    assert_eq!(extracted.text, body);
    assert_eq!(metadata["Processing-Method"], "direct");
    assert_eq!(metadata["File-Size-MB"], "0");
}
