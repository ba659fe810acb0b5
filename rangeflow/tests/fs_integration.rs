//! End-to-end tests over the filesystem store.
//!
//! Files are uploaded from disk as chunks, stored as real files under a
//! temporary root, and read back through the access-checked service.
//!
//! Run with: `cargo test --test fs_integration`

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use rangeflow::access::{AccessList, AccessMode, AllowAll, StoreCatalog};
use rangeflow::store::{FsStore, StoreClient};
use rangeflow::transfer::{
    chunk_key, sha256_hex, FileSource, RetryPolicy, TransferCoordinator, TransferSettings,
};
use rangeflow::{FileTransferService, ResponseStatus, TransferError};

// ============================================================================
// Helper Functions
// ============================================================================

const FILE_SIZE: usize = 100_000;
const CHUNK_SIZE: u64 = 16 * 1024;

fn payload() -> Vec<u8> {
    (0..FILE_SIZE).map(|i| ((i * 31) % 251) as u8).collect()
}

fn client(root: &TempDir) -> StoreClient {
    StoreClient::new(Arc::new(FsStore::new(root.path().join("store"))))
}

fn coordinator(client: StoreClient) -> TransferCoordinator {
    let settings = TransferSettings::default()
        .with_chunk_size(CHUNK_SIZE)
        .with_upload_chunk_size(CHUNK_SIZE)
        .with_concurrency(3)
        .with_retry(RetryPolicy::immediate(2));
    TransferCoordinator::new(client, settings).unwrap()
}

async fn write_source(dir: &TempDir, data: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("source.bin");
    tokio::fs::write(&path, data).await.unwrap();
    path
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A file uploaded from disk lands as one stored file per chunk, each
/// matching its manifest entry.
#[tokio::test]
async fn test_file_upload_to_fs_store() {
    let dir = TempDir::new().unwrap();
    let data = payload();
    let path = write_source(&dir, &data).await;
    let source = Arc::new(FileSource::open(&path).await.unwrap());

    let coordinator = coordinator(client(&dir));
    let manifest = coordinator
        .upload_parallel(
            source,
            FILE_SIZE as u64,
            |i| chunk_key("uploads/source", i),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

    // 100_000 / 16_384 rounds up to 7
    assert_eq!(manifest.chunks.len(), 7);
    assert_eq!(manifest.total_size, FILE_SIZE as u64);

    for chunk in &manifest.chunks {
        let stored = tokio::fs::read(dir.path().join("store").join(&chunk.key))
            .await
            .unwrap();
        let start = chunk.offset as usize;
        let end = start + chunk.size as usize;
        assert_eq!(stored, &data[start..end], "chunk {}", chunk.index);
        assert_eq!(chunk.sha256, sha256_hex(&stored));
    }
}

/// Whole-file and ranged downloads through the service read the stored
/// object byte-exact.
#[tokio::test]
async fn test_service_download_from_fs_store() {
    let dir = TempDir::new().unwrap();
    let data = payload();
    let client = client(&dir);
    client
        .put_object("media/clip.bin", Bytes::from(data.clone()), &CancellationToken::new())
        .await
        .unwrap();

    let service = FileTransferService::new(
        Arc::new(AllowAll),
        Arc::new(StoreCatalog::new(client.clone())),
        coordinator(client),
    );
    let cancel = CancellationToken::new();

    let full = service
        .open_download("alice", "media/clip.bin", None, &cancel, None)
        .await
        .unwrap();
    assert_eq!(full.status, ResponseStatus::Full);
    assert_eq!(full.stream.read_to_end().await.unwrap(), data);

    let tail = service
        .open_download("alice", "media/clip.bin", Some("bytes=-5000"), &cancel, None)
        .await
        .unwrap();
    assert_eq!(tail.status.code(), 206);
    assert_eq!(tail.content_range.as_deref(), Some("bytes 95000-99999/100000"));
    assert_eq!(tail.stream.read_to_end().await.unwrap(), &data[95_000..]);

    let missing = service
        .open_download("alice", "media/none.bin", None, &cancel, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, TransferError::FileNotFound { .. }));
}

/// The body can be consumed as an `AsyncRead`.
#[tokio::test]
async fn test_range_stream_as_async_read() {
    let dir = TempDir::new().unwrap();
    let data = payload();
    let client = client(&dir);
    client
        .put_object("obj", Bytes::from(data.clone()), &CancellationToken::new())
        .await
        .unwrap();

    let stream = coordinator(client)
        .open_range_stream("obj", FILE_SIZE as u64, 20_000, 59_999, &CancellationToken::new())
        .unwrap();

    let mut reader = stream.into_async_read();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, &data[20_000..60_000]);
}

/// Read-only grants let a principal download but not upload.
#[tokio::test]
async fn test_read_grant_does_not_allow_upload() {
    let dir = TempDir::new().unwrap();
    let client = client(&dir);
    client
        .put_object("docs/a.txt", Bytes::from_static(b"hello"), &CancellationToken::new())
        .await
        .unwrap();

    let acl = Arc::new(AccessList::new());
    acl.grant("bob", "docs/a.txt", AccessMode::Read);
    let service = FileTransferService::new(
        acl,
        Arc::new(StoreCatalog::new(client.clone())),
        coordinator(client),
    );
    let cancel = CancellationToken::new();

    let body = service
        .open_download("bob", "docs/a.txt", None, &cancel, None)
        .await
        .unwrap()
        .stream
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(body, b"hello");

    let err = service
        .upload(
            "bob",
            "docs/a.txt",
            "docs/a.txt.v2",
            Arc::new(Bytes::from_static(b"changed")),
            7,
            &cancel,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AccessDenied { .. }));
    assert!(!dir.path().join("store/docs/a.txt.v2").exists());
}
