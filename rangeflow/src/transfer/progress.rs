//! Progress reporting for chunked transfers.
//!
//! A [`ProgressTracker`] is a cheap-to-clone handle over atomic counters.
//! The coordinator updates it as chunks complete; any number of observers
//! (a progress bar, a status endpoint) poll [`ProgressTracker::snapshot`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    total_bytes: AtomicU64,
    total_chunks: AtomicUsize,
    bytes_done: AtomicU64,
    chunks_done: AtomicUsize,
    retries: AtomicU64,
    finished: AtomicBool,
    failed: AtomicBool,
}

/// Shared progress counters for one transfer.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    counters: Arc<Counters>,
}

/// Point-in-time copy of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Bytes the transfer will move.
    pub total_bytes: u64,
    /// Chunks in the plan.
    pub total_chunks: usize,
    /// Bytes delivered (downloads) or stored (uploads) so far.
    pub bytes_done: u64,
    /// Chunks finished so far.
    pub chunks_done: usize,
    /// Retries made across all chunks.
    pub retries: u64,
    /// The transfer has ended, successfully or not.
    pub finished: bool,
    /// The transfer ended with an error.
    pub failed: bool,
}

impl ProgressSnapshot {
    /// Completion as a fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.finished { 1.0 } else { 0.0 };
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

impl ProgressTracker {
    /// Create a tracker with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the size of the planned transfer.
    pub fn begin(&self, total_bytes: u64, total_chunks: usize) {
        self.counters.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.counters.total_chunks.store(total_chunks, Ordering::SeqCst);
    }

    /// Record bytes moved without completing a chunk.
    pub fn add_bytes(&self, bytes: u64) {
        self.counters.bytes_done.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Record a finished chunk of `bytes` bytes.
    pub fn complete_chunk(&self, bytes: u64) {
        self.add_bytes(bytes);
        self.counters.chunks_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Record retries made by a chunk.
    pub fn add_retries(&self, retries: u64) {
        if retries > 0 {
            self.counters.retries.fetch_add(retries, Ordering::SeqCst);
        }
    }

    /// Mark the transfer as ended.
    pub fn finish(&self, success: bool) {
        self.counters.failed.store(!success, Ordering::SeqCst);
        self.counters.finished.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`finish`](Self::finish) was called.
    pub fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::SeqCst)
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = &self.counters;
        ProgressSnapshot {
            total_bytes: c.total_bytes.load(Ordering::SeqCst),
            total_chunks: c.total_chunks.load(Ordering::SeqCst),
            bytes_done: c.bytes_done.load(Ordering::SeqCst),
            chunks_done: c.chunks_done.load(Ordering::SeqCst),
            retries: c.retries.load(Ordering::SeqCst),
            finished: c.finished.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_shared_between_clones() {
        let tracker = ProgressTracker::new();
        let observer = tracker.clone();

        tracker.begin(100, 4);
        tracker.complete_chunk(25);
        tracker.complete_chunk(25);
        tracker.add_retries(2);
        tracker.add_retries(0);

        let snap = observer.snapshot();
        assert_eq!(snap.total_bytes, 100);
        assert_eq!(snap.total_chunks, 4);
        assert_eq!(snap.bytes_done, 50);
        assert_eq!(snap.chunks_done, 2);
        assert_eq!(snap.retries, 2);
        assert!(!snap.finished);
        assert!((snap.fraction() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_records_outcome() {
        let tracker = ProgressTracker::new();
        tracker.finish(false);
        let snap = tracker.snapshot();
        assert!(snap.finished);
        assert!(snap.failed);
        assert!(tracker.is_finished());
    }

    #[test]
    fn test_empty_transfer_fraction() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot().fraction(), 0.0);
        tracker.finish(true);
        assert_eq!(tracker.snapshot().fraction(), 1.0);
    }
}
