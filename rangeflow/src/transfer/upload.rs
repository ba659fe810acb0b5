//! Upload sources, chunk naming and the upload manifest.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::store::BoxFuture;

/// Random-access byte source for parallel uploads.
///
/// Workers read their chunk independently, possibly more than once when an
/// attempt is retried.
pub trait RandomAccessSource: Send + Sync {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> BoxFuture<'_, io::Result<Bytes>>;
}

impl RandomAccessSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> BoxFuture<'_, io::Result<Bytes>> {
        Box::pin(async move {
            let start = usize::try_from(offset).map_err(|_| eof(offset, len))?;
            let end = start.checked_add(len).ok_or_else(|| eof(offset, len))?;
            if end > self.len() {
                return Err(eof(offset, len));
            }
            Ok(self.slice(start..end))
        })
    }
}

fn eof(offset: u64, len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at {} past end of source", len, offset),
    )
}

/// A local file read at arbitrary offsets.
///
/// Each read opens its own handle, so workers never wait on each other's
/// seek position.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Open `path` for reading.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, size })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomAccessSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, len: usize) -> BoxFuture<'_, io::Result<Bytes>> {
        Box::pin(async move {
            let mut buf = vec![0u8; len];
            let mut file = File::open(&self.path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }
}

/// Store key of chunk `index` under `base`: `{base}/chunk_{index}`.
pub fn chunk_key(base: &str, index: usize) -> String {
    format!("{}/chunk_{}", base.trim_end_matches('/'), index)
}

/// Hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// One stored chunk of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedChunk {
    /// Chunk index.
    pub index: usize,
    /// Key the chunk was stored under.
    pub key: String,
    /// Offset of the chunk in the source.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// Hex SHA-256 of the chunk.
    pub sha256: String,
}

/// Record of a completed upload, chunks in index order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadManifest {
    /// Size of the uploaded source.
    pub total_size: u64,
    /// Stored chunks.
    pub chunks: Vec<UploadedChunk>,
}

impl UploadManifest {
    /// Keys in index order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.key.as_str())
    }
}
