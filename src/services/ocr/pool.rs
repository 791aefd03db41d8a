//! Bounded admission for OCR chunk tasks.
//!
//! Chunks run on tokio's blocking pool. At most `max_threads` of them run at
//! once and up to `queue_capacity` more may wait for a slot. Once both are
//! taken the submitter runs the chunk itself and waits for it before it
//! submits anything else, so a saturated pool throttles submission instead of
//! growing without bound.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

/// Where a submitted job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Admitted to the pool; runs once a slot is free.
    Queued,
    /// Executed by the submitter because the pool was saturated.
    CallerRan,
}

/// Releases an admission slot when the job holding it ends.
struct Admission(Arc<AtomicUsize>);

impl Drop for Admission {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded pool with a caller-runs policy when saturated.
///
/// Shared by every document processed through one pipeline.
pub struct WorkerPool {
    name: String,
    permits: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    max_threads: usize,
    queue_capacity: usize,
    caller_runs: AtomicU64,
}

impl WorkerPool {
    pub fn new(name: &str, max_threads: usize, queue_capacity: usize) -> Self {
        let max_threads = max_threads.max(1);
        debug!(
            "Created {} pool: {} concurrent tasks, {} queued",
            name, max_threads, queue_capacity
        );
        Self {
            name: name.to_string(),
            permits: Arc::new(Semaphore::new(max_threads)),
            admitted: Arc::new(AtomicUsize::new(0)),
            max_threads,
            queue_capacity,
            caller_runs: AtomicU64::new(0),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Jobs admitted and not yet finished, running or waiting.
    pub fn in_flight(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    /// Jobs currently holding a slot.
    pub fn running(&self) -> usize {
        self.max_threads - self.permits.available_permits()
    }

    /// Jobs the submitter had to run itself.
    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    fn try_admit(&self) -> Option<Admission> {
        let capacity = self.max_threads + self.queue_capacity;
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| Admission(Arc::clone(&self.admitted)))
    }

    /// Submit `job`, collecting its result in `tasks`.
    ///
    /// A panicking job surfaces as a panicked [`JoinError`] in `tasks`.
    pub async fn execute<T, F>(
        &self,
        tasks: &mut JoinSet<Result<T, JoinError>>,
        job: F,
    ) -> Submission
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if let Some(admission) = self.try_admit() {
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let permit = permits.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || {
                    let _slot = (admission, permit);
                    job()
                })
                .await
            });
            return Submission::Queued;
        }

        self.caller_runs.fetch_add(1, Ordering::Relaxed);
        debug!("{} pool saturated, running task on the submitter", self.name);
        let result = tokio::task::spawn_blocking(job).await;
        tasks.spawn(async move { result });
        Submission::CallerRan
    }
}
