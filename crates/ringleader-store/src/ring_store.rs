//! Versioned (ring, builder) persistence.
//!
//! Layout inside the blob store:
//!
//! ```text
//! 00000000000000000007-ring.ring
//! 00000000000000000007-ring.builder
//! 00000000000000000008-ring.ring
//! 00000000000000000008-ring.builder
//! CURRENT
//! ```
//!
//! Artifacts are immutable once written unless explicitly replaced.
//! `CURRENT` is a small postcard manifest naming the active version and the
//! blake3 checksum of both of its artifacts; it is always the last thing
//! written, so a crash at any point leaves the previous current pair intact.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use ringleader_ring::RingCodec;
use ringleader_types::RingVersion;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::traits::BlobStore;

/// Key of the manifest naming the current version.
pub const CURRENT_KEY: &str = "CURRENT";

const RING_SUFFIX: &str = "-ring.ring";
const BUILDER_SUFFIX: &str = "-ring.builder";
const MIN_RETAIN: usize = 2;

/// Blob key of the ring artifact for `version`.
pub fn ring_key(version: RingVersion) -> String {
    format!("{version:020}{RING_SUFFIX}")
}

/// Blob key of the builder artifact for `version`.
pub fn builder_key(version: RingVersion) -> String {
    format!("{version:020}{BUILDER_SUFFIX}")
}

/// A persisted (ring, builder) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRing {
    pub version: RingVersion,
    pub ring: Bytes,
    pub builder: Bytes,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: RingVersion,
    ring_sum: [u8; 32],
    builder_sum: [u8; 32],
}

enum Artifact {
    Ring,
    Builder,
}

/// Versioned ring persistence on top of a [`BlobStore`].
pub struct RingStore {
    blobs: Arc<dyn BlobStore>,
    codec: Arc<dyn RingCodec>,
    retain: usize,
}

impl RingStore {
    /// Create a ring store keeping at most `retain` versions (at least two).
    pub fn new(blobs: Arc<dyn BlobStore>, codec: Arc<dyn RingCodec>, retain: usize) -> Self {
        Self {
            blobs,
            codec,
            retain: retain.max(MIN_RETAIN),
        }
    }

    pub fn retain(&self) -> usize {
        self.retain
    }

    pub fn codec(&self) -> &Arc<dyn RingCodec> {
        &self.codec
    }

    /// Load the current pair.
    ///
    /// Follows `CURRENT` when present and verifies both checksums. Without a
    /// manifest, falls back to the newest builder on disk and its ring of
    /// the same version.
    pub async fn load(&self) -> Result<StoredRing, StoreError> {
        match self.read_manifest().await? {
            Some(manifest) => self.load_manifest(&manifest).await,
            None => self.load_by_scan().await,
        }
    }

    /// Version named by `CURRENT`, if any.
    pub async fn current_version(&self) -> Result<Option<RingVersion>, StoreError> {
        Ok(self.read_manifest().await?.map(|m| m.version))
    }

    /// Persist a complete pair and make it current.
    ///
    /// Fails with [`StoreError::VersionExists`] if either artifact already
    /// exists with different bytes.
    pub async fn save(
        &self,
        version: RingVersion,
        ring: Bytes,
        builder: Bytes,
    ) -> Result<(), StoreError> {
        self.save_ring(version, ring.clone()).await?;
        self.save_builder(version, builder.clone()).await?;
        self.write_manifest(version, &ring, &builder).await?;
        info!(version, "ring version saved");
        self.prune(version).await
    }

    /// Persist only the ring artifact of `version`.
    ///
    /// The bytes must decode to a ring of that version. Storing identical
    /// bytes twice is a no-op.
    pub async fn save_ring(&self, version: RingVersion, ring: Bytes) -> Result<(), StoreError> {
        self.check_ring(version, &ring)?;
        self.put_immutable(&ring_key(version), version, ring).await
    }

    /// Persist only the builder artifact of `version`.
    pub async fn save_builder(
        &self,
        version: RingVersion,
        builder: Bytes,
    ) -> Result<(), StoreError> {
        self.check_builder(version, &builder)?;
        self.put_immutable(&builder_key(version), version, builder)
            .await
    }

    /// Like [`save_ring`](Self::save_ring), but overwrites whatever is
    /// stored for `version`. Only a forced resync from the master uses this.
    pub async fn replace_ring(&self, version: RingVersion, ring: Bytes) -> Result<(), StoreError> {
        self.check_ring(version, &ring)?;
        self.put_replacing(&ring_key(version), ring).await
    }

    /// Like [`save_builder`](Self::save_builder), but overwrites whatever
    /// is stored for `version`.
    pub async fn replace_builder(
        &self,
        version: RingVersion,
        builder: Bytes,
    ) -> Result<(), StoreError> {
        self.check_builder(version, &builder)?;
        self.put_replacing(&builder_key(version), builder).await
    }

    /// Load a retained historical pair.
    pub async fn load_version(&self, version: RingVersion) -> Result<StoredRing, StoreError> {
        let ring = self.blobs.get(&ring_key(version)).await?;
        let builder = self.blobs.get(&builder_key(version)).await?;
        match (ring, builder) {
            (Some(ring), Some(builder)) => {
                self.check_versions(version, &ring, &builder)?;
                Ok(StoredRing {
                    version,
                    ring,
                    builder,
                })
            }
            _ => Err(StoreError::VersionNotFound(version)),
        }
    }

    /// Make a retained version current. Used by revert.
    pub async fn set_current(&self, version: RingVersion) -> Result<StoredRing, StoreError> {
        let pair = self.load_version(version).await?;
        self.write_manifest(version, &pair.ring, &pair.builder)
            .await?;
        info!(version, "current ring version set");
        Ok(pair)
    }

    /// Versions for which both artifacts are retained, ascending.
    pub async fn versions(&self) -> Result<Vec<RingVersion>, StoreError> {
        let keys = self.blobs.list().await?;
        let rings: BTreeSet<_> = artifact_versions(&keys, Artifact::Ring).collect();
        Ok(artifact_versions(&keys, Artifact::Builder)
            .filter(|v| rings.contains(v))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    /// Highest version of any artifact ever written and still present,
    /// including the current one.
    pub async fn highest_version(&self) -> Result<Option<RingVersion>, StoreError> {
        let keys = self.blobs.list().await?;
        let on_disk = artifact_versions(&keys, Artifact::Ring)
            .chain(artifact_versions(&keys, Artifact::Builder))
            .max();
        let current = self.current_version().await?;
        Ok(on_disk.max(current))
    }

    async fn put_immutable(
        &self,
        key: &str,
        version: RingVersion,
        data: Bytes,
    ) -> Result<(), StoreError> {
        if let Some(existing) = self.blobs.get(key).await? {
            if existing == data {
                debug!(key, "artifact already stored");
                return Ok(());
            }
            return Err(StoreError::VersionExists(version));
        }
        self.blobs.put(key, data).await
    }

    async fn put_replacing(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        match self.blobs.get(key).await? {
            Some(existing) if existing == data => {
                debug!(key, "artifact already stored");
                return Ok(());
            }
            Some(_) => warn!(key, "replacing stored artifact"),
            None => {}
        }
        self.blobs.put(key, data).await
    }

    fn check_ring(&self, version: RingVersion, ring: &[u8]) -> Result<(), StoreError> {
        let decoded = self.codec.load_ring(ring)?.version();
        if decoded != version {
            return Err(StoreError::VersionMismatch {
                manifest: version,
                ring: decoded,
                builder: version,
            });
        }
        Ok(())
    }

    fn check_builder(&self, version: RingVersion, builder: &[u8]) -> Result<(), StoreError> {
        let decoded = self.codec.load_builder(builder)?.version();
        if decoded != version {
            return Err(StoreError::VersionMismatch {
                manifest: version,
                ring: version,
                builder: decoded,
            });
        }
        Ok(())
    }

    async fn read_manifest(&self) -> Result<Option<Manifest>, StoreError> {
        match self.blobs.get(CURRENT_KEY).await? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_manifest(
        &self,
        version: RingVersion,
        ring: &[u8],
        builder: &[u8],
    ) -> Result<(), StoreError> {
        let manifest = Manifest {
            version,
            ring_sum: *blake3::hash(ring).as_bytes(),
            builder_sum: *blake3::hash(builder).as_bytes(),
        };
        let bytes = postcard::to_allocvec(&manifest)?;
        self.blobs.put(CURRENT_KEY, Bytes::from(bytes)).await
    }

    async fn load_manifest(&self, manifest: &Manifest) -> Result<StoredRing, StoreError> {
        let version = manifest.version;
        let builder_key = builder_key(version);
        let ring_key = ring_key(version);

        let builder = self
            .blobs
            .get(&builder_key)
            .await?
            .ok_or(StoreError::NoRingFound)?;
        let ring = self
            .blobs
            .get(&ring_key)
            .await?
            .ok_or(StoreError::NoMatchingRing(version))?;

        if *blake3::hash(&ring).as_bytes() != manifest.ring_sum {
            return Err(StoreError::ChecksumMismatch(ring_key));
        }
        if *blake3::hash(&builder).as_bytes() != manifest.builder_sum {
            return Err(StoreError::ChecksumMismatch(builder_key));
        }
        self.check_versions(version, &ring, &builder)?;

        debug!(version, "loaded ring from manifest");
        Ok(StoredRing {
            version,
            ring,
            builder,
        })
    }

    async fn load_by_scan(&self) -> Result<StoredRing, StoreError> {
        let keys = self.blobs.list().await?;
        let version = artifact_versions(&keys, Artifact::Builder)
            .max()
            .ok_or(StoreError::NoRingFound)?;
        warn!(version, "no CURRENT manifest, using newest builder on disk");

        let builder = self
            .blobs
            .get(&builder_key(version))
            .await?
            .ok_or(StoreError::NoRingFound)?;
        let ring = self
            .blobs
            .get(&ring_key(version))
            .await?
            .ok_or(StoreError::NoMatchingRing(version))?;
        self.check_versions(version, &ring, &builder)?;

        Ok(StoredRing {
            version,
            ring,
            builder,
        })
    }

    /// Decode both artifacts and require they carry `expected`.
    fn check_versions(
        &self,
        expected: RingVersion,
        ring: &[u8],
        builder: &[u8],
    ) -> Result<(), StoreError> {
        let ring = self.codec.load_ring(ring)?.version();
        let builder = self.codec.load_builder(builder)?.version();
        if ring != expected || builder != expected {
            return Err(StoreError::VersionMismatch {
                manifest: expected,
                ring,
                builder,
            });
        }
        Ok(())
    }

    /// Delete everything older than the newest `retain` versions, never
    /// touching `current`.
    pub async fn prune(&self, current: RingVersion) -> Result<(), StoreError> {
        let keys = self.blobs.list().await?;
        let all: BTreeSet<RingVersion> = artifact_versions(&keys, Artifact::Ring)
            .chain(artifact_versions(&keys, Artifact::Builder))
            .collect();

        for version in all.iter().rev().skip(self.retain).copied() {
            if version == current {
                continue;
            }
            self.blobs.delete(&ring_key(version)).await?;
            self.blobs.delete(&builder_key(version)).await?;
            debug!(version, "pruned ring version");
        }
        Ok(())
    }
}

fn artifact_versions(keys: &[String], kind: Artifact) -> impl Iterator<Item = RingVersion> + '_ {
    let suffix = match kind {
        Artifact::Ring => RING_SUFFIX,
        Artifact::Builder => BUILDER_SUFFIX,
    };
    keys.iter()
        .filter_map(move |k| k.strip_suffix(suffix))
        .filter_map(|v| v.parse().ok())
}
