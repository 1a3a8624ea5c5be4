//! Ring persistence.
//!
//! This crate defines the [`BlobStore`] trait, an opaque key → bytes store,
//! with two backends:
//!
//! - [`MemoryBlobStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileBlobStore`]: one file per key in a flat directory, written
//!   atomically (temp file + rename).
//!
//! On top of it, [`RingStore`] keeps immutable, versioned (ring, builder)
//! pairs and a `CURRENT` manifest naming the active version.

mod error;
mod file_store;
mod memory_store;
mod ring_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileBlobStore;
pub use memory_store::MemoryBlobStore;
pub use ring_store::{CURRENT_KEY, RingStore, StoredRing, builder_key, ring_key};
pub use traits::BlobStore;
