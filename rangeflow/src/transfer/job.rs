//! Transfer settings and per-transfer job plans.

use std::time::Duration;

use super::chunk::{self, ChunkDescriptor};
use super::policy::RetryPolicy;
use super::range::ByteRange;
use crate::error::{TransferError, TransferResult};

/// Default chunk size for downloads (5 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default chunk size for uploads (10 MiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of chunks in flight per transfer.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default deadline for a single chunk attempt.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables shared by every transfer a coordinator runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSettings {
    /// Bytes per download chunk.
    pub chunk_size: u64,
    /// Bytes per upload chunk.
    pub upload_chunk_size: u64,
    /// Maximum chunks in flight.
    pub concurrency: usize,
    /// Maximum chunks dispatched past the next one due for output.
    ///
    /// Bounds reassembly memory to roughly `reorder_window * chunk_size`.
    pub reorder_window: usize,
    /// Retry behavior for transient chunk failures.
    pub retry: RetryPolicy,
    /// Deadline for each chunk attempt.
    pub chunk_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            reorder_window: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
        }
    }
}

impl TransferSettings {
    /// Set the download chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the upload chunk size.
    pub fn with_upload_chunk_size(mut self, chunk_size: u64) -> Self {
        self.upload_chunk_size = chunk_size;
        self
    }

    /// Set the concurrency limit. The reorder window follows if it was
    /// smaller.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self.reorder_window = self.reorder_window.max(concurrency);
        self
    }

    /// Set the reorder window.
    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt deadline.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Reject settings no transfer can run with.
    pub fn validate(&self) -> TransferResult<()> {
        let invalid = |msg: &str| Err(TransferError::InvalidArgument(msg.to_string()));

        if self.chunk_size == 0 {
            return invalid("chunk_size must be at least 1 byte");
        }
        if self.upload_chunk_size == 0 {
            return invalid("upload_chunk_size must be at least 1 byte");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.reorder_window == 0 {
            return invalid("reorder_window must be at least 1");
        }
        if self.retry.max_attempts() == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if self.chunk_timeout.is_zero() {
            return invalid("chunk_timeout must be positive");
        }
        Ok(())
    }
}

/// The plan for one transfer: which chunks, and how to run them.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Size of the whole object.
    pub total_size: u64,
    /// Bytes covered by the plan.
    pub range: Option<ByteRange>,
    /// Chunk size used for planning.
    pub chunk_size: u64,
    /// Chunks in ascending offset order.
    pub chunks: Vec<ChunkDescriptor>,
    /// Maximum chunks in flight.
    pub concurrency: usize,
    /// Retry behavior.
    pub retry: RetryPolicy,
    /// Per-attempt deadline.
    pub chunk_timeout: Duration,
}

impl TransferJob {
    /// Plan a download of `range`, or of the whole object when `None`.
    pub fn download(
        total_size: u64,
        range: Option<ByteRange>,
        settings: &TransferSettings,
    ) -> TransferResult<Self> {
        settings.validate()?;

        let range = match range {
            Some(range) => {
                // Re-check against this object; ranges may be built for another size.
                Some(ByteRange::new(range.start(), range.end(), total_size)?)
            }
            None => ByteRange::full(total_size),
        };
        let chunks = match range {
            Some(range) => chunk::plan_range(range, settings.chunk_size)?,
            None => Vec::new(),
        };

        Ok(Self::from_parts(total_size, range, settings.chunk_size, chunks, settings))
    }

    /// Plan an upload of a `total_size`-byte source.
    pub fn upload(total_size: u64, settings: &TransferSettings) -> TransferResult<Self> {
        settings.validate()?;
        let chunks = chunk::plan(total_size, settings.upload_chunk_size)?;
        Ok(Self::from_parts(
            total_size,
            ByteRange::full(total_size),
            settings.upload_chunk_size,
            chunks,
            settings,
        ))
    }

    fn from_parts(
        total_size: u64,
        range: Option<ByteRange>,
        chunk_size: u64,
        chunks: Vec<ChunkDescriptor>,
        settings: &TransferSettings,
    ) -> Self {
        Self {
            total_size,
            range,
            chunk_size,
            chunks,
            concurrency: settings.concurrency,
            retry: settings.retry.clone(),
            chunk_timeout: settings.chunk_timeout,
        }
    }

    /// Bytes the job moves.
    pub fn len(&self) -> u64 {
        self.range.map_or(0, |r| r.len())
    }

    /// Returns true if there is nothing to transfer.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of planned chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Attempts allowed per chunk.
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts()
    }
}
