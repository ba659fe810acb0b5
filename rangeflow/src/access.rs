//! Access control and file lookup collaborators.
//!
//! The engine does not decide who may read or write a file, nor where a
//! file lives. Both questions are delegated to traits supplied by the
//! embedding application.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransferResult;
use crate::store::{BoxFuture, StoreClient};

/// Kind of access being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Download or stream.
    Read,
    /// Upload or replace.
    Write,
}

/// Decides whether a principal may access a resource.
pub trait AccessPolicy: Send + Sync {
    /// Returns true if `principal` may access `resource_id` in `mode`.
    fn check_access(&self, principal: &str, resource_id: &str, mode: AccessMode) -> bool;
}

/// Grants everything. For single-user tools and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check_access(&self, _principal: &str, _resource_id: &str, _mode: AccessMode) -> bool {
        true
    }
}

/// Explicit grant list. Write access does not imply read access.
#[derive(Debug, Default)]
pub struct AccessList {
    grants: RwLock<HashSet<(String, String, AccessMode)>>,
}

impl AccessList {
    /// Create an empty list that denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `principal` to access `resource_id` in `mode`.
    pub fn grant(&self, principal: &str, resource_id: &str, mode: AccessMode) {
        self.grants
            .write()
            .insert((principal.to_string(), resource_id.to_string(), mode));
    }

    /// Withdraw a grant.
    pub fn revoke(&self, principal: &str, resource_id: &str, mode: AccessMode) {
        self.grants
            .write()
            .remove(&(principal.to_string(), resource_id.to_string(), mode));
    }
}

impl AccessPolicy for AccessList {
    fn check_access(&self, principal: &str, resource_id: &str, mode: AccessMode) -> bool {
        self.grants
            .read()
            .contains(&(principal.to_string(), resource_id.to_string(), mode))
    }
}

/// Where a file's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    /// Object key in the store.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Resolves file ids to store locations.
pub trait FileCatalog: Send + Sync {
    /// Look up a file; `Ok(None)` if it does not exist.
    fn locate<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, TransferResult<Option<FileLocation>>>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    files: RwLock<HashMap<String, FileLocation>>,
}

impl StaticCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a file.
    pub fn insert(&self, file_id: impl Into<String>, key: impl Into<String>, size: u64) {
        self.files.write().insert(
            file_id.into(),
            FileLocation {
                key: key.into(),
                size,
            },
        );
    }
}

impl FileCatalog for StaticCatalog {
    fn locate<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, TransferResult<Option<FileLocation>>> {
        Box::pin(async move { Ok(self.files.read().get(file_id).cloned()) })
    }
}

type CandidateKeys = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// Catalog that asks the store itself.
///
/// By default the file id is the key. With [`StoreCatalog::with_candidates`]
/// a file may live under one of several keys (a current layout and older
/// ones); the first key that exists wins.
#[derive(Clone)]
pub struct StoreCatalog {
    client: StoreClient,
    candidates: Arc<CandidateKeys>,
}

impl std::fmt::Debug for StoreCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCatalog")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl StoreCatalog {
    /// Create a catalog where file ids are store keys.
    pub fn new(client: StoreClient) -> Self {
        Self::with_candidates(client, |file_id| vec![file_id.to_string()])
    }

    /// Create a catalog that tries `candidates(file_id)` in order.
    pub fn with_candidates<F>(client: StoreClient, candidates: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            client,
            candidates: Arc::new(candidates),
        }
    }
}

impl FileCatalog for StoreCatalog {
    fn locate<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, TransferResult<Option<FileLocation>>> {
        Box::pin(async move {
            // Lookups are short; they are not tied to a transfer's token.
            let cancel = CancellationToken::new();
            let keys = (self.candidates)(file_id);

            for (attempt, key) in keys.into_iter().enumerate() {
                if let Some(size) = self.client.find_object_size(&key, &cancel).await? {
                    if attempt > 0 {
                        debug!(file_id, key = %key, "File found under fallback key");
                    }
                    return Ok(Some(FileLocation { key, size }));
                }
            }
            Ok(None)
        })
    }
}
