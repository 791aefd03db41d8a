//! Parallel OCR over rendered pages.
//!
//! Pages are split into contiguous chunks, one task per chunk. Every task
//! builds its own engine instance, so engines are never shared between
//! threads. A failed page contributes no text; a failed task fails the run.
//! Chunk texts are combined in `start_index` order regardless of which task
//! finished first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::pool::WorkerPool;
use super::types::{ChunkJob, ChunkResult, OcrPipelineError, PageImage, PageProgress};
use crate::ocr::EngineFactory;

/// Split pages sorted by index into contiguous chunks of `chunk_size`.
pub fn partition(pages: Vec<PageImage>, chunk_size: usize) -> Vec<ChunkJob> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(pages.len().div_ceil(chunk_size));
    let mut current: Vec<PageImage> = Vec::with_capacity(chunk_size);

    for page in pages {
        current.push(page);
        if current.len() == chunk_size {
            let images = std::mem::replace(&mut current, Vec::with_capacity(chunk_size));
            chunks.push(ChunkJob {
                start_index: images[0].page_index,
                images,
            });
        }
    }
    if let Some(first) = current.first() {
        chunks.push(ChunkJob {
            start_index: first.page_index,
            images: current,
        });
    }
    chunks
}

/// Order chunk results by `start_index` and join the non-empty ones.
pub fn combine(mut results: Vec<ChunkResult>) -> String {
    results.sort_by_key(|r| r.start_index);
    results
        .into_iter()
        .map(|r| r.text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wall-clock limit shared by every chunk of one run.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    at: Instant,
    limit_minutes: u32,
}

impl Deadline {
    fn start(limit_minutes: u32) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + Duration::from_secs(u64::from(limit_minutes) * 60),
            limit_minutes,
        }
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn expired(&self) -> OcrPipelineError {
        OcrPipelineError::Timeout {
            limit_minutes: self.limit_minutes,
            elapsed: self.started.elapsed(),
        }
    }

    fn check(&self) -> Result<(), OcrPipelineError> {
        if Instant::now() >= self.at {
            return Err(self.expired());
        }
        Ok(())
    }
}

/// OCR every page of a chunk with a dedicated engine instance.
///
/// The chunk stops with `Timeout` before starting a page once the deadline
/// has passed, so work left over from an abandoned run winds down quickly.
fn run_chunk(
    job: ChunkJob,
    engines: &dyn EngineFactory,
    progress: &PageProgress,
    total_pages: u32,
    deadline: Deadline,
) -> Result<ChunkResult, OcrPipelineError> {
    let mut engine = engines
        .new_instance()
        .map_err(|source| OcrPipelineError::Ocr {
            start_index: job.start_index,
            source,
        })?;

    let mut texts: Vec<String> = Vec::with_capacity(job.images.len());

    for image in &job.images {
        deadline.check()?;

        match engine.recognize(&image.file_path) {
            Ok(text) => {
                let text = text.trim_end();
                if !text.trim().is_empty() {
                    texts.push(text.to_string());
                }
            }
            Err(e) => {
                warn!("OCR failed for page {}, skipping: {}", image.page_index + 1, e);
            }
        }

        let completed = progress.record_page();
        if completed % 5 == 0 || completed == total_pages {
            info!(
                "Processed page {} of {} ({}%)",
                completed,
                total_pages,
                completed as u64 * 100 / u64::from(total_pages.max(1))
            );
        }
    }

    Ok(ChunkResult {
        start_index: job.start_index,
        text: texts.join("\n"),
    })
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn task_failed(e: JoinError) -> OcrPipelineError {
    let reason = if e.is_panic() {
        format!("chunk task panicked: {}", panic_reason(e.into_panic().as_ref()))
    } else {
        format!("chunk task did not finish: {}", e)
    };
    OcrPipelineError::TaskFailed { reason }
}

type ChunkOutcome = Result<Result<ChunkResult, OcrPipelineError>, JoinError>;

/// Runs chunk tasks on a shared worker pool under a global timeout.
#[derive(Clone)]
pub struct OcrScheduler {
    pool: Arc<WorkerPool>,
    engines: Arc<dyn EngineFactory>,
    chunk_size: usize,
    timeout_minutes: u32,
}

impl OcrScheduler {
    pub fn new(
        pool: Arc<WorkerPool>,
        engines: Arc<dyn EngineFactory>,
        chunk_size: u32,
        timeout_minutes: u32,
    ) -> Self {
        Self {
            pool,
            engines,
            chunk_size: chunk_size.max(1) as usize,
            timeout_minutes,
        }
    }

    /// OCR `pages` in parallel chunks and return their text in page order.
    ///
    /// Resolves once every chunk finished or the global timeout elapsed.
    /// Chunks still queued when the run fails never start; running ones stop
    /// at their next page boundary once the deadline has passed.
    pub async fn process(
        &self,
        mut pages: Vec<PageImage>,
        total_pages: u32,
        progress: &PageProgress,
    ) -> Result<String, OcrPipelineError> {
        if pages.is_empty() {
            return Ok(String::new());
        }

        pages.sort_by_key(|p| p.page_index);
        let chunks = partition(pages, self.chunk_size);
        let deadline = Deadline::start(self.timeout_minutes);

        info!(
            "Starting parallel OCR for {} pages in {} chunks of up to {}",
            total_pages,
            chunks.len(),
            self.chunk_size
        );

        let run = self.run_chunks(chunks, total_pages, progress, deadline);
        let result = match tokio::time::timeout(deadline.remaining(), run).await {
            Ok(result) => result,
            Err(_) => Err(deadline.expired()),
        };

        if let Err(OcrPipelineError::Timeout { limit_minutes, .. }) = &result {
            error!("OCR processing timed out after {} minutes", limit_minutes);
        }
        result
    }

    async fn run_chunks(
        &self,
        chunks: Vec<ChunkJob>,
        total_pages: u32,
        progress: &PageProgress,
        deadline: Deadline,
    ) -> Result<String, OcrPipelineError> {
        let expected = chunks.len();
        let mut tasks: JoinSet<ChunkOutcome> = JoinSet::new();

        for job in chunks {
            let engines = Arc::clone(&self.engines);
            let progress = progress.clone();
            let start_index = job.start_index;

            let submission = self
                .pool
                .execute(&mut tasks, move || {
                    run_chunk(job, engines.as_ref(), &progress, total_pages, deadline)
                })
                .await;
            debug!("Chunk at page {} submitted: {:?}", start_index + 1, submission);
        }

        let mut results = Vec::with_capacity(expected);
        while let Some(joined) = tasks.join_next().await {
            // Dropping `tasks` on the way out aborts chunks still waiting for a slot.
            match joined.and_then(|outcome| outcome).map_err(task_failed)? {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("OCR chunk failed, discarding {} finished chunks: {}", results.len(), e);
                    return Err(e);
                }
            }
        }

        info!(
            "Parallel OCR finished {} chunks in {:.1}s",
            expected,
            deadline.started.elapsed().as_secs_f64()
        );
        Ok(combine(results))
    }

    /// OCR `pages` on the calling thread with a single engine instance.
    ///
    /// Used for short documents where spinning up chunk tasks costs more than
    /// it saves. The global timeout is checked before each page.
    pub fn process_inline(
        &self,
        mut pages: Vec<PageImage>,
        total_pages: u32,
        progress: &PageProgress,
    ) -> Result<String, OcrPipelineError> {
        if pages.is_empty() {
            return Ok(String::new());
        }

        pages.sort_by_key(|p| p.page_index);
        let job = ChunkJob {
            start_index: pages[0].page_index,
            images: pages,
        };

        info!("Starting sequential OCR for {} pages", total_pages);
        let deadline = Deadline::start(self.timeout_minutes);
        run_chunk(job, self.engines.as_ref(), progress, total_pages, deadline)
            .map(|result| result.text)
    }
}
