//! In-process object store.

use bytes::Bytes;
use dashmap::DashMap;

use super::{BoxFuture, RangeStore};
use crate::error::{StoreError, StoreResult};

/// Object store backed by a concurrent hash map.
///
/// Range reads slice the stored `Bytes` without copying.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, Bytes>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing the async interface.
    pub fn insert(&self, key: impl Into<String>, data: Bytes) {
        self.objects.insert(key.into(), data);
    }

    /// Get a copy of an object's bytes.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|v| v.value().clone())
    }

    /// Check whether a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn lookup(&self, key: &str) -> StoreResult<Bytes> {
        self.get(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

impl RangeStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn object_size<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<u64>> {
        Box::pin(async move { self.lookup(key).map(|data| data.len() as u64) })
    }

    fn get_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move { self.lookup(key) })
    }

    fn get_range<'a>(
        &'a self,
        key: &'a str,
        start: u64,
        end: u64,
    ) -> BoxFuture<'a, StoreResult<Bytes>> {
        Box::pin(async move {
            let data = self.lookup(key)?;
            let len = data.len() as u64;
            if start > end || end >= len {
                return Err(StoreError::Terminal(format!(
                    "range {}-{} outside object {} of {} bytes",
                    start, end, key, len
                )));
            }
            Ok(data.slice(start as usize..=end as usize))
        })
    }

    fn put_object<'a>(&'a self, key: &'a str, data: Bytes) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.objects.insert(key.to_string(), data);
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.objects.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store
            .put_object("a/b", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(store.contains("a/b"));
        assert_eq!(store.object_size("a/b").await.unwrap(), 5);
        assert_eq!(&store.get_object("a/b").await.unwrap()[..], b"hello");

        store.delete_object("a/b").await.unwrap();
        assert!(!store.contains("a/b"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete_object("nothing").await.is_ok());
    }

    #[tokio::test]
    async fn test_range_outside_object_is_terminal() {
        let store = MemoryStore::new();
        store.insert("obj", Bytes::from_static(b"abc"));

        let err = store.get_range("obj", 1, 3).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryStore::new();
        let err = store.get_range("nope", 0, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_keys_sorted() {
        let store = MemoryStore::new();
        store.insert("b", Bytes::new());
        store.insert("a", Bytes::new());
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
