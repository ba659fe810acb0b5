//! Object store abstraction.
//!
//! The transfer engine talks to the backing object store through the
//! [`RangeStore`] trait: whole-object reads, byte-range reads, puts and
//! deletes by key. Backends:
//!
//! - [`MemoryStore`]: in-process map, used by tests and dry runs
//! - [`FsStore`]: a directory of files, one file per key
//! - [`HttpStore`]: S3-style HTTP endpoint (`GET` with `Range`, `PUT`, `DELETE`)
//!
//! The engine never uses a backend directly. It goes through [`StoreClient`],
//! which races every call against a cancellation token and converts backend
//! failures into the engine's error taxonomy.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so backends can be held as
//! `Arc<dyn RangeStore>` and chosen at runtime from configuration.

mod client;
mod fs;
mod http;
mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreResult;

pub use client::StoreClient;
pub use fs::FsStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte-addressable object storage.
///
/// All implementations must be `Send + Sync`; a single instance is shared by
/// every worker of every transfer. Calls are stateless, so no coordination
/// between callers is needed.
pub trait RangeStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Returns the size of an object in bytes.
    fn object_size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<u64>>;

    /// Reads a whole object.
    fn get_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Bytes>>;

    /// Reads bytes `start..=end` of an object.
    ///
    /// Implementations should return exactly `end - start + 1` bytes;
    /// [`StoreClient`] rejects anything else.
    fn get_range<'a>(
        &'a self,
        key: &'a str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'a, StoreResult<Bytes>>;

    /// Writes an object, replacing any previous value.
    fn put_object<'a>(&'a self, key: &'a str, data: Bytes) -> BoxFuture<'a, StoreResult<()>>;

    /// Deletes an object. Deleting a missing object succeeds.
    fn delete_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}

/// Builds the backend selected by the `[store]` configuration section.
pub fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn RangeStore>> {
    let store: Arc<dyn RangeStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Fs => Arc::new(FsStore::new(config.root.clone())),
        StoreBackend::Http => Arc::new(HttpStore::with_timeout(
            config.endpoint.clone(),
            config.request_timeout,
        )?),
    };
    tracing::debug!(backend = store.name(), "Object store initialized");
    Ok(store)
}
