//! Error types for the cluster crate.

use ringleader_store::StoreError;
use ringleader_types::{ErrorKind, NodeId, RingVersion, RpcError};

/// Errors produced by the registry, the change pipeline and both services.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The requested node was not found in the registry.
    #[error("node {0} not found")]
    NotFound(NodeId),

    /// A node with this id already exists.
    #[error("node {0} already exists")]
    DuplicateId(NodeId),

    /// The node's addresses or tiers are not admitted by the filters.
    #[error("rejected by admission filters: {0}")]
    FilterRejected(String),

    /// `ModNode` named an attribute that cannot be modified.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// `ModNode` value could not be converted to the attribute's type.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The requested version was never stored or has been pruned.
    #[error("version {0} not found")]
    VersionNotFound(RingVersion),

    /// No builder artifact exists.
    #[error("no ring found")]
    NoRingFound,

    /// A builder exists without the ring of the same version.
    #[error("no ring matching builder version {0}")]
    NoMatchingRing(RingVersion),

    /// Persisted ring, builder and manifest disagree.
    #[error("persisted ring state is inconsistent: {0}")]
    VersionMismatch(String),

    /// Too many slaves failed for the cluster to converge.
    #[error("quorum failed: {failed} of {total} slaves failed")]
    QuorumFailed { failed: usize, total: usize },

    /// A slave refused a push that does not advance its version.
    #[error("stale version {version}: slave is at {current}")]
    StaleVersion {
        version: RingVersion,
        current: RingVersion,
    },

    /// Invalid static configuration (filters, slave list).
    #[error("configuration error: {0}")]
    Config(String),

    /// The change pipeline has stopped.
    #[error("service stopped")]
    ServiceStopped,

    /// Rendering or decoding a ring failed.
    #[error("ring codec error: {0}")]
    Ring(#[from] ringleader_ring::RingError),

    /// Ring persistence failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// A network-level error.
    #[error("network error: {0}")]
    Net(#[from] ringleader_net::NetError),
}

impl From<StoreError> for ClusterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoRingFound => ClusterError::NoRingFound,
            StoreError::NoMatchingRing(v) => ClusterError::NoMatchingRing(v),
            StoreError::VersionNotFound(v) => ClusterError::VersionNotFound(v),
            e @ (StoreError::VersionMismatch { .. } | StoreError::ChecksumMismatch(_)) => {
                ClusterError::VersionMismatch(e.to_string())
            }
            e => ClusterError::Store(e),
        }
    }
}

impl ClusterError {
    /// Failure class reported on the wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::NotFound(_) => ErrorKind::NotFound,
            ClusterError::DuplicateId(_) => ErrorKind::DuplicateId,
            ClusterError::FilterRejected(_) => ErrorKind::FilterRejected,
            ClusterError::UnknownField(_) => ErrorKind::UnknownField,
            ClusterError::InvalidValue { .. } => ErrorKind::InvalidValue,
            ClusterError::VersionNotFound(_) => ErrorKind::VersionNotFound,
            ClusterError::NoRingFound => ErrorKind::NoRingFound,
            ClusterError::NoMatchingRing(_) => ErrorKind::NoMatchingRing,
            ClusterError::QuorumFailed { .. } => ErrorKind::QuorumFailed,
            ClusterError::StaleVersion { .. } => ErrorKind::StaleVersion,
            ClusterError::VersionMismatch(_)
            | ClusterError::Config(_)
            | ClusterError::ServiceStopped
            | ClusterError::Ring(_)
            | ClusterError::Store(_)
            | ClusterError::Net(_) => ErrorKind::Internal,
        }
    }

    pub fn to_rpc(&self) -> RpcError {
        RpcError::new(self.kind(), self.to_string())
    }
}
