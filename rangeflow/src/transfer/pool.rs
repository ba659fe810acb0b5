//! Bounded worker pool with per-chunk retry, timeout and cancellation.
//!
//! The pool runs one unit of work per [`ChunkDescriptor`] with at most
//! `concurrency` in flight. Each attempt races the work against the
//! per-attempt deadline and the transfer's cancellation token:
//!
//! ```text
//!  descriptors ──► admit (window permit, in index order)
//!                     │
//!                     ▼
//!               ┌───────────┐  attempt 1 ─✗ (transient) ─ wait ─► attempt 2 ─✓
//!               │  JoinSet  │  attempt 1 ─✗ (terminal)  ─► failure, cancel token
//!               │ ≤ N tasks │  cancelled ─────────────────► Cancelled
//!               └─────┬─────┘
//!                     ▼
//!           mpsc::Sender<ChunkResult>  (exactly one per descriptor)
//! ```
//!
//! The first non-cancellation failure cancels the token handed to
//! [`WorkerPool::run`], which stops in-flight attempts, retry waits and
//! further dispatch. Descriptors that were never dispatched are reported as
//! [`TransferError::Cancelled`] with zero attempts, so consumers always see
//! every descriptor exactly once.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::chunk::{ChunkDescriptor, ChunkResult};
use super::job::TransferJob;
use super::policy::RetryPolicy;
use super::window::ReorderWindow;
use crate::error::TransferError;

/// Summary of a finished pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Descriptors handed to the pool.
    pub total: usize,
    /// Chunks that produced output.
    pub succeeded: usize,
    /// Chunks that failed with a real error.
    pub failed: usize,
    /// Chunks cancelled in flight or never dispatched.
    pub cancelled: usize,
    /// Attempts made across all chunks.
    pub attempts: u64,
    /// Attempts beyond each chunk's first.
    pub retries: u64,
    /// The failure that triggered cancellation, if any.
    pub first_error: Option<TransferError>,
}

impl PoolReport {
    /// Returns true if every descriptor succeeded.
    pub fn is_success(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Runs chunk work with bounded concurrency.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    window: Option<ReorderWindow>,
}

impl WorkerPool {
    /// Create a pool. A concurrency of zero is treated as one.
    pub fn new(concurrency: usize, retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry,
            attempt_timeout,
            window: None,
        }
    }

    /// Create a pool with the limits of `job`.
    pub fn for_job(job: &TransferJob) -> Self {
        Self::new(job.concurrency, job.retry.clone(), job.chunk_timeout)
    }

    /// Require a window permit before each dispatch.
    pub fn with_window(mut self, window: ReorderWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Maximum chunks in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` for every descriptor and send each result to `results`.
    ///
    /// `work` receives the descriptor and the transfer's cancellation token.
    /// Sending blocks while the consumer is behind, which also holds back
    /// dispatch. If the consumer hangs up, the run is cancelled.
    ///
    /// Returns once every descriptor has been reported.
    pub async fn run<T, F, Fut>(
        &self,
        chunks: Vec<ChunkDescriptor>,
        work: F,
        results: mpsc::Sender<ChunkResult<T>>,
        cancel: &CancellationToken,
    ) -> PoolReport
    where
        T: Send + 'static,
        F: Fn(ChunkDescriptor, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TransferError>> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut report = PoolReport {
            total: chunks.len(),
            ..PoolReport::default()
        };
        let mut outstanding: BTreeMap<usize, ChunkDescriptor> = BTreeMap::new();
        let mut in_flight: JoinSet<ChunkResult<T>> = JoinSet::new();
        let mut queue = chunks.into_iter().peekable();

        debug!(
            chunks = report.total,
            concurrency = self.concurrency,
            max_attempts = self.retry.max_attempts(),
            "Starting worker pool"
        );

        loop {
            let can_dispatch = !cancel.is_cancelled()
                && queue.peek().is_some()
                && in_flight.len() < self.concurrency;
            if !can_dispatch && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                admitted = self.admit(cancel), if can_dispatch => {
                    if admitted {
                        if let Some(descriptor) = queue.next() {
                            outstanding.insert(descriptor.index, descriptor);
                            in_flight.spawn(attempt_chunk(
                                descriptor,
                                Arc::clone(&work),
                                self.retry.clone(),
                                self.attempt_timeout,
                                cancel.clone(),
                            ));
                        }
                    }
                }
                Some(joined) = in_flight.join_next() => match joined {
                    Ok(result) => {
                        outstanding.remove(&result.index());
                        deliver(result, &results, &mut report, cancel).await;
                    }
                    Err(e) => warn!(error = %e, "Chunk task ended without a result"),
                },
                else => break,
            }
        }

        for (_, descriptor) in outstanding {
            let error = TransferError::TerminalStore(format!(
                "worker for chunk {} ended without a result",
                descriptor.index
            ));
            deliver(ChunkResult::failure(descriptor, error, 1), &results, &mut report, cancel).await;
        }
        for descriptor in queue {
            let result = ChunkResult::failure(descriptor, TransferError::Cancelled, 0);
            deliver(result, &results, &mut report, cancel).await;
        }

        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            retries = report.retries,
            "Worker pool finished"
        );

        report
    }

    async fn admit(&self, cancel: &CancellationToken) -> bool {
        match &self.window {
            Some(window) => window.admit(cancel).await,
            None => true,
        }
    }
}

/// Account for one result and pass it on.
async fn deliver<T>(
    result: ChunkResult<T>,
    results: &mpsc::Sender<ChunkResult<T>>,
    report: &mut PoolReport,
    cancel: &CancellationToken,
) {
    report.attempts += u64::from(result.attempts);
    report.retries += u64::from(result.attempts.saturating_sub(1));

    match &result.outcome {
        Ok(_) => report.succeeded += 1,
        Err(e) if e.is_cancelled() => report.cancelled += 1,
        Err(e) => {
            report.failed += 1;
            // Errors arriving after cancellation began are fallout, not causes.
            if report.first_error.is_none() && !cancel.is_cancelled() {
                warn!(chunk = result.index(), error = %e, "Chunk failed, cancelling transfer");
                report.first_error = Some(e.clone());
                cancel.cancel();
            }
        }
    }

    if results.send(result).await.is_err() && !cancel.is_cancelled() {
        debug!("Result consumer went away, cancelling transfer");
        cancel.cancel();
    }
}

/// Run one chunk to completion: attempts, waits and all.
async fn attempt_chunk<T, F, Fut>(
    descriptor: ChunkDescriptor,
    work: Arc<F>,
    retry: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
) -> ChunkResult<T>
where
    F: Fn(ChunkDescriptor, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let index = descriptor.index;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return ChunkResult::failure(descriptor, TransferError::Cancelled, attempt);
        }
        attempt += 1;

        let call = AssertUnwindSafe(work(descriptor, cancel.clone())).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            timed = tokio::time::timeout(timeout, call) => match timed {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(TransferError::TerminalStore(format!(
                    "worker for chunk {} panicked",
                    index
                ))),
                Err(_) => Err(TransferError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        };

        let error = match outcome {
            Ok(output) => return ChunkResult::success(descriptor, output, attempt),
            Err(e) => e,
        };

        if error.is_cancelled() || !error.is_retryable() {
            return ChunkResult::failure(descriptor, error, attempt);
        }

        let Some(delay) = retry.delay_for_attempt(attempt) else {
            return ChunkResult::failure(descriptor, error.exhausted(index, attempt), attempt);
        };

        warn!(
            chunk = index,
            attempt,
            max_attempts = retry.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Chunk attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ChunkResult::failure(descriptor, TransferError::Cancelled, attempt);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
