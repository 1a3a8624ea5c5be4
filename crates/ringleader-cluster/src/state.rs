//! Published ring state.
//!
//! [`RingState`] is the shared, read-mostly view the master's query RPCs
//! answer from. The change pipeline publishes a new [`RingSnapshot`] after
//! every persisted version; readers clone an `Arc` and never see a torn
//! mix of two versions.

use std::sync::Arc;

use bytes::Bytes;
use ringleader_ring::RingBuilder;
use ringleader_types::RingVersion;
use tokio::sync::RwLock;
use tracing::debug;

/// One persisted version as seen by readers.
#[derive(Debug, Clone)]
pub struct RingSnapshot {
    pub version: RingVersion,
    /// Serialized ring, exactly as persisted and distributed.
    pub ring: Bytes,
    /// Serialized builder, exactly as persisted and distributed.
    pub builder_bytes: Bytes,
    /// Decoded builder, for membership and configuration queries.
    pub builder: RingBuilder,
}

/// Shared holder of the current snapshot.
pub struct RingState {
    current: RwLock<Arc<RingSnapshot>>,
}

impl RingState {
    pub fn new(snapshot: RingSnapshot) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Return the current snapshot.
    pub async fn snapshot(&self) -> Arc<RingSnapshot> {
        self.current.read().await.clone()
    }

    pub async fn version(&self) -> RingVersion {
        self.current.read().await.version
    }

    /// Replace the current snapshot.
    pub(crate) async fn publish(&self, snapshot: RingSnapshot) {
        let version = snapshot.version;
        *self.current.write().await = Arc::new(snapshot);
        debug!(version, "published ring snapshot");
    }
}
