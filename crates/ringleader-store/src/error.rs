//! Error types for ring persistence.

use ringleader_types::RingVersion;

/// Errors that can occur while persisting or loading rings.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No builder artifact exists at all.
    #[error("no builder found")]
    NoRingFound,

    /// A builder exists but the ring of the same version does not.
    #[error("no ring matching builder version {0}")]
    NoMatchingRing(RingVersion),

    /// The requested version was never stored or has been pruned.
    #[error("version {0} not found")]
    VersionNotFound(RingVersion),

    /// A different artifact is already stored under this version.
    #[error("version {0} already exists with different content")]
    VersionExists(RingVersion),

    /// The ring, builder and manifest do not agree on the version.
    #[error("version mismatch: manifest {manifest}, ring {ring}, builder {builder}")]
    VersionMismatch {
        /// Version named by the manifest (or by the file name on a scan).
        manifest: RingVersion,
        /// Version decoded from the ring artifact.
        ring: RingVersion,
        /// Version decoded from the builder artifact.
        builder: RingVersion,
    },

    /// Artifact bytes do not match the checksum recorded in the manifest.
    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    /// Keys must be plain file names.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored artifact could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ringleader_ring::RingError),

    /// The manifest could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}
