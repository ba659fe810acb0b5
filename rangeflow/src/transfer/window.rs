//! Reorder window: caps how far dispatch may run ahead of output.
//!
//! The pool takes one permit before dispatching each chunk, strictly in
//! index order. The consumer gives permits back as chunks leave the
//! reassembly buffer. With a window of `w`, at most `w` chunks are ever in
//! flight or buffered at once, so buffered memory stays near
//! `w * chunk_size` no matter how slow one early chunk is.
//!
//! Because permits are taken in index order, the next chunk due for output
//! always holds one; the window cannot deadlock.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Shared permit pool bounding dispatched-but-not-emitted chunks.
#[derive(Debug, Clone)]
pub struct ReorderWindow {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ReorderWindow {
    /// Create a window of `size` chunks (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Window size in chunks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Take one permit, or return false if `cancel` fires first.
    ///
    /// The permit is detached; [`release`](Self::release) returns it.
    pub async fn admit(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Give back `count` permits after chunks were emitted.
    pub fn release(&self, count: usize) {
        if count > 0 {
            self.permits.add_permits(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_admit_until_full() {
        let window = ReorderWindow::new(2);
        let cancel = CancellationToken::new();

        assert!(window.admit(&cancel).await);
        assert!(window.admit(&cancel).await);
        assert_eq!(window.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(20), window.admit(&cancel)).await;
        assert!(blocked.is_err(), "third admit should wait");

        window.release(1);
        assert!(window.admit(&cancel).await);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_admit() {
        let window = ReorderWindow::new(1);
        let cancel = CancellationToken::new();
        assert!(window.admit(&cancel).await);

        let waiter = {
            let window = window.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { window.admit(&cancel).await })
        };
        cancel.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[test]
    fn test_zero_size_becomes_one() {
        let window = ReorderWindow::new(0);
        assert_eq!(window.size(), 1);
        assert_eq!(window.available(), 1);
    }
}
