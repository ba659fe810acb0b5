//! Directory-backed object store.
//!
//! Each key maps to a file under a root directory; `/` in a key becomes a
//! directory separator. Writes go to a temporary sibling and are renamed into
//! place so readers never observe half-written objects.

use std::io::{self, SeekFrom};
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{BoxFuture, RangeStore};
use crate::error::{StoreError, StoreResult};

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting traversal.
    fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        let invalid = || StoreError::InvalidKey {
            key: key.to_string(),
        };

        if key.is_empty() {
            return Err(invalid());
        }

        let relative = Path::new(key);
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(invalid());
            }
        }

        Ok(self.root.join(relative))
    }
}

/// Map "file is missing" onto the store's not-found error.
fn not_found_or(key: &str, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else {
        StoreError::Io(err)
    }
}

impl RangeStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    fn object_size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<u64>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            let meta = fs::metadata(&path).await.map_err(|e| not_found_or(key, e))?;
            Ok(meta.len())
        })
    }

    fn get_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            let data = fs::read(&path).await.map_err(|e| not_found_or(key, e))?;
            Ok(Bytes::from(data))
        })
    }

    fn get_range<'a>(
        &'a self,
        key: &'a str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            let mut file = File::open(&path).await.map_err(|e| not_found_or(key, e))?;

            let len = file.metadata().await?.len();
            if start > end || end >= len {
                return Err(StoreError::Terminal(format!(
                    "range {}-{} outside object {} of {} bytes",
                    start, end, key, len
                )));
            }

            file.seek(SeekFrom::Start(start)).await?;
            let mut buf = vec![0u8; (end - start + 1) as usize];
            file.read_exact(&mut buf).await?;
            Ok(Bytes::from(buf))
        })
    }

    fn put_object<'a>(&'a self, key: &'a str, data: Bytes) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }

            let mut tmp_name = path.as_os_str().to_owned();
            tmp_name.push(".partial");
            let tmp = PathBuf::from(tmp_name);

            let mut file = File::create(&tmp).await?;
            let written = async {
                file.write_all(&data).await?;
                file.sync_all().await
            }
            .await;

            if let Err(e) = written {
                let _ = fs::remove_file(&tmp).await;
                return Err(e.into());
            }

            fs::rename(&tmp, &path).await?;
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}
