//! File transfer service: access checks and `Range` header handling in
//! front of the coordinator.
//!
//! This is the layer an HTTP handler calls. It resolves a file id, checks
//! the caller's permission before any store I/O, parses the `Range` header
//! and reports what the response should look like (`200` or `206`, the
//! `Content-Length` and `Content-Range` values) together with the body
//! stream.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::access::{AccessMode, AccessPolicy, FileCatalog};
use crate::error::{TransferError, TransferResult};
use crate::transfer::{
    chunk_key, ByteRange, ProgressTracker, RandomAccessSource, RangeStream, TransferCoordinator,
    UploadManifest,
};

/// Whether a download answers the whole file or a requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// No `Range` header; the whole file (`200 OK`).
    Full,
    /// A single requested range (`206 Partial Content`).
    Partial,
}

impl ResponseStatus {
    /// HTTP status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Full => 200,
            Self::Partial => 206,
        }
    }
}

/// An opened download.
#[derive(Debug)]
pub struct DownloadResponse {
    /// Full or partial.
    pub status: ResponseStatus,
    /// Size of the whole file.
    pub total_size: u64,
    /// Bytes the body will carry.
    pub content_length: u64,
    /// `Content-Range` value for partial responses.
    pub content_range: Option<String>,
    /// The body, in order.
    pub stream: RangeStream,
}

/// Access-checked entry point for downloads and uploads.
pub struct FileTransferService {
    access: Arc<dyn AccessPolicy>,
    catalog: Arc<dyn FileCatalog>,
    coordinator: TransferCoordinator,
}

impl std::fmt::Debug for FileTransferService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTransferService")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl FileTransferService {
    /// Create a service.
    pub fn new(
        access: Arc<dyn AccessPolicy>,
        catalog: Arc<dyn FileCatalog>,
        coordinator: TransferCoordinator,
    ) -> Self {
        Self {
            access,
            catalog,
            coordinator,
        }
    }

    /// The coordinator transfers run on.
    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }

    fn authorize(&self, principal: &str, file_id: &str, mode: AccessMode) -> TransferResult<()> {
        if self.access.check_access(principal, file_id, mode) {
            return Ok(());
        }
        warn!(principal, file_id, ?mode, "Access denied");
        Err(TransferError::AccessDenied {
            resource: file_id.to_string(),
        })
    }

    /// Open a download of `file_id`, honoring an optional `Range` header.
    ///
    /// Errors before any byte is streamed: `AccessDenied`, `FileNotFound`,
    /// `UnsupportedRange` (malformed or multi-range header) and
    /// `InvalidRange` (unsatisfiable, i.e. `416`).
    pub async fn open_download(
        &self,
        principal: &str,
        file_id: &str,
        range_header: Option<&str>,
        cancel: &CancellationToken,
        progress: Option<ProgressTracker>,
    ) -> TransferResult<DownloadResponse> {
        self.authorize(principal, file_id, AccessMode::Read)?;

        let location = self
            .catalog
            .locate(file_id)
            .await?
            .ok_or_else(|| TransferError::FileNotFound {
                file_id: file_id.to_string(),
            })?;

        let range = match range_header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(header) => Some(ByteRange::parse_header(header, location.size)?),
            None => None,
        };

        debug!(file_id, key = %location.key, size = location.size, ?range, "Opening download");
        let stream = self
            .coordinator
            .download(&location.key, location.size, range, cancel, progress)?;

        Ok(match range {
            Some(range) => DownloadResponse {
                status: ResponseStatus::Partial,
                total_size: location.size,
                content_length: range.len(),
                content_range: Some(range.content_range(location.size)),
                stream,
            },
            None => DownloadResponse {
                status: ResponseStatus::Full,
                total_size: location.size,
                content_length: location.size,
                content_range: None,
                stream,
            },
        })
    }

    /// Upload `total_size` bytes of `source` as chunks under `base_key`.
    ///
    /// Chunk `i` is stored at [`chunk_key`]`(base_key, i)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        principal: &str,
        file_id: &str,
        base_key: &str,
        source: Arc<dyn RandomAccessSource>,
        total_size: u64,
        cancel: &CancellationToken,
        progress: Option<ProgressTracker>,
    ) -> TransferResult<UploadManifest> {
        self.authorize(principal, file_id, AccessMode::Write)?;

        let base = base_key.to_string();
        self.coordinator
            .upload_parallel(
                source,
                total_size,
                move |index| chunk_key(&base, index),
                cancel,
                progress,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessList, AllowAll, StaticCatalog};
    use crate::store::{MemoryStore, StoreClient};
    use crate::transfer::{RetryPolicy, TransferSettings};
    use bytes::Bytes;

    fn service(access: Arc<dyn AccessPolicy>) -> (FileTransferService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        store.insert("users/1/report.pdf", Bytes::from(data));

        let catalog = StaticCatalog::new();
        catalog.insert("file-1", "users/1/report.pdf", 10_000);

        let settings = TransferSettings::default()
            .with_chunk_size(3_000)
            .with_retry(RetryPolicy::immediate(3));
        let coordinator =
            TransferCoordinator::new(StoreClient::new(store.clone()), settings).unwrap();

        (
            FileTransferService::new(access, Arc::new(catalog), coordinator),
            store,
        )
    }

    #[tokio::test]
    async fn test_full_download() {
        let (service, store) = service(Arc::new(AllowAll));
        let response = service
            .open_download("alice", "file-1", None, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(response.status, ResponseStatus::Full);
        assert_eq!(response.status.code(), 200);
        assert_eq!(response.content_length, 10_000);
        assert!(response.content_range.is_none());

        let body = response.stream.read_to_end().await.unwrap();
        assert_eq!(body, store.get("users/1/report.pdf").unwrap());
    }

    #[tokio::test]
    async fn test_partial_download() {
        let (service, store) = service(Arc::new(AllowAll));
        let response = service
            .open_download(
                "alice",
                "file-1",
                Some("bytes=1000-1999"),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.status.code(), 206);
        assert_eq!(response.content_length, 1000);
        assert_eq!(
            response.content_range.as_deref(),
            Some("bytes 1000-1999/10000")
        );

        let body = response.stream.read_to_end().await.unwrap();
        let full = store.get("users/1/report.pdf").unwrap();
        assert_eq!(body, &full[1000..2000]);
    }

    #[tokio::test]
    async fn test_denied_before_any_io() {
        let acl = Arc::new(AccessList::new());
        acl.grant("alice", "file-1", AccessMode::Read);
        let (service, _) = service(acl);

        let err = service
            .open_download("mallory", "file-1", None, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::AccessDenied {
                resource: "file-1".into()
            }
        );

        let err = service
            .upload(
                "alice",
                "file-1",
                "users/1/new",
                Arc::new(Bytes::from_static(b"data")),
                4,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let (service, _) = service(Arc::new(AllowAll));
        let err = service
            .open_download("alice", "file-404", None, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_bad_range_headers() {
        let (service, _) = service(Arc::new(AllowAll));
        let cancel = CancellationToken::new();

        let err = service
            .open_download("a", "file-1", Some("bytes=0-1,5-9"), &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UnsupportedRange(_)));

        let err = service
            .open_download("a", "file-1", Some("bytes=20000-"), &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_upload_writes_chunk_keys() {
        let (service, store) = service(Arc::new(AllowAll));
        let manifest = service
            .upload(
                "alice",
                "file-2",
                "users/1/new",
                Arc::new(Bytes::from(vec![7u8; 25])),
                25,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(manifest.chunks.len(), 1);
        assert!(store.contains("users/1/new/chunk_0"));
    }
}
