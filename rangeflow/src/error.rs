//! Error types for the transfer engine and the object store adapters.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is raised by [`RangeStore`](crate::store::RangeStore)
//!   backends and classifies each failure as transient or terminal.
//! - [`TransferError`] is the engine-level taxonomy surfaced to callers of the
//!   coordinator. It is `Clone` so a single failure can be handed to the
//!   output stream and to the pool report at the same time.

use std::io;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors raised by object store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The key cannot be mapped onto the backend (e.g. path traversal).
    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    /// The backend returned fewer or more bytes than requested.
    #[error("short read for {key}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A temporary failure (connection reset, 5xx, throttling).
    #[error("transient store failure: {0}")]
    Transient(String),

    /// A permanent failure that will not go away on retry.
    #[error("store failure: {0}")]
    Terminal(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) | Self::LengthMismatch { .. } => true,
            Self::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            Self::NotFound { .. } | Self::InvalidKey { .. } | Self::Terminal(_) => false,
        }
    }
}

/// Errors surfaced by the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Bad size or settings input; raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested byte range does not fit the object.
    #[error("invalid range {start}-{end} for object of {total_size} bytes")]
    InvalidRange {
        start: u64,
        end: u64,
        total_size: u64,
    },

    /// Malformed `Range` header.
    #[error("unsupported range header: {0}")]
    UnsupportedRange(String),

    /// A retryable store failure.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// A store failure that retrying cannot fix.
    #[error("terminal store error: {0}")]
    TerminalStore(String),

    /// A single attempt exceeded its deadline.
    #[error("attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The principal may not access the resource.
    #[error("access denied to {resource}")]
    AccessDenied { resource: String },

    /// The requested file is not in the catalog.
    #[error("file not found: {file_id}")]
    FileNotFound { file_id: String },

    /// Reading the local upload source failed.
    #[error("failed to read upload source: {0}")]
    Source(String),

    /// The transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Returns true if the worker pool should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::Timeout { .. })
    }

    /// Returns true if this error is the cancellation signal itself.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts a retryable error into the terminal form used once the
    /// retry budget is exhausted.
    pub(crate) fn exhausted(self, index: usize, attempts: u32) -> Self {
        if self.is_retryable() {
            Self::TerminalStore(format!(
                "chunk {} failed after {} attempts: {}",
                index, attempts, self
            ))
        } else {
            self
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::TransientStore(err.to_string())
        } else {
            Self::TerminalStore(err.to_string())
        }
    }
}

impl From<TransferError> for io::Error {
    fn from(err: TransferError) -> Self {
        let kind = match err {
            TransferError::Cancelled => io::ErrorKind::Interrupted,
            TransferError::Timeout { .. } => io::ErrorKind::TimedOut,
            TransferError::AccessDenied { .. } => io::ErrorKind::PermissionDenied,
            TransferError::FileNotFound { .. } => io::ErrorKind::NotFound,
            TransferError::InvalidArgument(_)
            | TransferError::InvalidRange { .. }
            | TransferError::UnsupportedRange(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
