//! rangeflow - concurrent range-addressed transfers for object storage.
//!
//! Large objects are moved as fixed-size chunks with bounded parallelism,
//! per-chunk retry and timeout, and ordered reassembly, so a caller can
//! stream a file (or any byte range of it) while later chunks are still in
//! flight.
//!
//! # Modules
//!
//! - [`transfer`]: chunk planning, worker pool, reassembly, coordinator
//! - [`store`]: the [`RangeStore`](store::RangeStore) abstraction and its
//!   memory, filesystem and HTTP backends
//! - [`service`]: access-checked downloads with `Range` header handling
//! - [`access`]: access policy and file catalog collaborators
//! - [`config`]: INI configuration
//! - [`logging`]: `tracing` subscriber setup
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rangeflow::store::{MemoryStore, StoreClient};
//! use rangeflow::transfer::{TransferCoordinator, TransferSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = StoreClient::new(Arc::new(MemoryStore::new()));
//! let coordinator = TransferCoordinator::new(client, TransferSettings::default())?;
//! let stream = coordinator.open_range_stream("videos/a.mp4", size, 0, 1_048_575, &CancellationToken::new())?;
//! ```

pub mod access;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod store;
pub mod transfer;

pub use error::{StoreError, StoreResult, TransferError, TransferResult};
pub use service::{DownloadResponse, FileTransferService, ResponseStatus};
pub use transfer::{ByteRange, RangeStream, TransferCoordinator, TransferSettings};

/// Crate version, from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
