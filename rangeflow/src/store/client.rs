//! Cancellation-aware client over a [`RangeStore`].

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::RangeStore;
use crate::error::{StoreError, StoreResult, TransferError, TransferResult};

/// Range Store Client used by the transfer engine.
///
/// Wraps a shared backend and gives every operation an externally supplied
/// cancellation signal. Cloning is cheap; all clones share one backend and
/// its connection pool.
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn RangeStore>,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("backend", &self.store.name())
            .finish()
    }
}

impl StoreClient {
    /// Create a client over the given backend.
    pub fn new(store: Arc<dyn RangeStore>) -> Self {
        Self { store }
    }

    /// Name of the underlying backend.
    pub fn backend(&self) -> &str {
        self.store.name()
    }

    /// Size of an object in bytes.
    pub async fn object_size(&self, key: &str, cancel: &CancellationToken) -> TransferResult<u64> {
        guarded(cancel, self.store.object_size(key)).await
    }

    /// Size of an object, or `None` if it does not exist.
    pub async fn find_object_size(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> TransferResult<Option<u64>> {
        let store = &self.store;
        guarded(cancel, async move {
            match store.object_size(key).await {
                Ok(size) => Ok(Some(size)),
                Err(StoreError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Fetch a whole object.
    pub async fn get_object(&self, key: &str, cancel: &CancellationToken) -> TransferResult<Bytes> {
        guarded(cancel, self.store.get_object(key)).await
    }

    /// Fetch bytes `start..=end` of an object.
    ///
    /// A response whose length differs from the requested range is reported
    /// as a retryable failure.
    pub async fn get_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> TransferResult<Bytes> {
        if start > end {
            return Err(TransferError::InvalidArgument(format!(
                "range start {} is past end {}",
                start, end
            )));
        }

        let expected = end - start + 1;
        let store = &self.store;
        let data = guarded(cancel, async move {
            let data = store.get_range(key, start, end).await?;
            if data.len() as u64 != expected {
                return Err(StoreError::LengthMismatch {
                    key: key.to_string(),
                    expected,
                    actual: data.len() as u64,
                });
            }
            Ok(data)
        })
        .await?;

        trace!(key, start, end, "Range read complete");
        Ok(data)
    }

    /// Store an object.
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> TransferResult<()> {
        guarded(cancel, self.store.put_object(key, data)).await
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str, cancel: &CancellationToken) -> TransferResult<()> {
        guarded(cancel, self.store.delete_object(key)).await
    }
}

/// Runs a store future unless the token fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = StoreResult<T>>,
) -> TransferResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = fut => result.map_err(TransferError::from),
    }
}
