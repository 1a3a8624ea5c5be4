//! In-memory blob storage backend.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{BlobStore, validate_key};

/// In-memory blob store backed by a `RwLock<BTreeMap>`.
///
/// Useful for tests and for slaves that should not touch disk. Writes can
/// be made to fail on demand with [`MemoryBlobStore::fail_writes`].
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with an I/O error (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other(
                "write failure injected",
            )));
        }
        debug!(key, size = data.len(), "storing blob in memory");
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        validate_key(key)?;
        Ok(self.blobs.read().expect("lock poisoned").get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.blobs.write().expect("lock poisoned").remove(key);
        debug!(key, "deleted blob from memory");
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.blobs.read().expect("lock poisoned").contains_key(key))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .blobs
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect())
    }
}
