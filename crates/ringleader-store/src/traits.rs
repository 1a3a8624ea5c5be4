//! Core trait for opaque blob storage.

use bytes::Bytes;

use crate::error::StoreError;

/// Opaque key → bytes storage.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// `put` must be atomic: a reader sees either the old value or the new one,
/// never a partial write.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Retrieve a value. Returns `None` if not found.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check whether a key exists.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// List all stored keys.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject keys that could escape the store's namespace or collide with
/// temp files.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with(".tmp")
        && !key.contains(['/', '\\']);
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
