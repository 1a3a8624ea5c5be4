//! The slave's RingDist service.
//!
//! A slave is `Uninitialized` until its first complete pair lands, then
//! `Active(version)`. Store, Setup and Revert run one at a time under the
//! state lock, so a slave never interleaves two pushes.

use std::sync::Arc;

use bytes::Bytes;
use ringleader_ring::{Ring, RingBuilder};
use ringleader_store::{RingStore, StoreError};
use ringleader_types::{RingMsg, RingVersion, StatusMsg, StatusRequest, StoreResult};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ClusterError;

struct Active {
    version: RingVersion,
    ring: Ring,
    builder: RingBuilder,
}

/// How a pushed pair meets artifacts already on disk.
#[derive(Clone, Copy)]
enum Push {
    /// Same-version bytes must match.
    Store,
    /// Same-version bytes are overwritten.
    Setup,
}

impl Push {
    fn name(self) -> &'static str {
        match self {
            Push::Store => "store",
            Push::Setup => "setup",
        }
    }
}

#[derive(Default)]
struct SlaveState {
    current: Option<Active>,
    /// Peer that pushed the current pair.
    master: String,
}

/// Slave-side ring replica.
pub struct RingDist {
    store: Arc<RingStore>,
    state: Mutex<SlaveState>,
}

impl RingDist {
    /// Open the replica on top of `store`, resuming from its current pair
    /// if there is one.
    pub async fn open(store: Arc<RingStore>) -> Result<Self, ClusterError> {
        let current = match store.load().await {
            Ok(pair) => {
                let active = decode(&store, pair.version, &pair.ring, &pair.builder)?;
                info!(version = active.version, "slave resumed ring");
                Some(active)
            }
            Err(StoreError::NoRingFound) => {
                info!("slave has no ring yet, waiting for setup");
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            store,
            state: Mutex::new(SlaveState {
                current,
                master: String::new(),
            }),
        })
    }

    /// Current version, 0 while uninitialized.
    pub async fn version(&self) -> RingVersion {
        current_version(&*self.state.lock().await)
    }

    /// Accept a newer version from the master.
    ///
    /// Rejects anything at or below the current version with
    /// [`ClusterError::StaleVersion`]. Ring and builder are persisted
    /// independently; the version becomes current only if both succeed.
    pub async fn store(&self, origin: &str, msg: RingMsg) -> Result<StoreResult, ClusterError> {
        let mut state = self.state.lock().await;
        let current = current_version(&state);
        if msg.version <= current {
            warn!(
                version = msg.version,
                current,
                master = %origin,
                "rejected stale store"
            );
            return Err(ClusterError::StaleVersion {
                version: msg.version,
                current,
            });
        }
        Ok(self.apply(&mut state, origin, Push::Store, msg).await)
    }

    /// Install a pair regardless of the current version.
    ///
    /// Artifacts already stored under the same version are overwritten, so
    /// setup repairs a slave holding different bytes for that version.
    /// Repeating the same setup is a no-op on disk and leaves the same
    /// current version.
    pub async fn setup(&self, origin: &str, msg: RingMsg) -> StoreResult {
        let mut state = self.state.lock().await;
        self.apply(&mut state, origin, Push::Setup, msg).await
    }

    /// Make a locally retained version current again.
    pub async fn revert(
        &self,
        origin: &str,
        version: RingVersion,
    ) -> Result<StoreResult, ClusterError> {
        let mut state = self.state.lock().await;
        let pair = match self.store.set_current(version).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(version, master = %origin, "revert failed: {e}");
                return Err(e.into());
            }
        };
        let active = decode(&self.store, pair.version, &pair.ring, &pair.builder)?;
        let from = current_version(&state);
        state.current = Some(active);
        state.master = origin.to_string();
        warn!(from, to = version, master = %origin, "slave reverted ring");
        Ok(StoreResult {
            version,
            ring: true,
            builder: true,
            err_msg: String::new(),
        })
    }

    /// Report the current version and the requested health text.
    pub async fn status(&self, req: StatusRequest) -> StatusMsg {
        let state = self.state.lock().await;
        let (ringstats, builderstats) = match &state.current {
            Some(active) => (active.ring.stats(), active.builder.stats()),
            None => ("no ring".to_string(), "no builder".to_string()),
        };
        StatusMsg {
            version: current_version(&state),
            ringstats: if req.ring { ringstats } else { String::new() },
            builderstats: if req.builder { builderstats } else { String::new() },
            master: state.master.clone(),
        }
    }

    async fn apply(
        &self,
        state: &mut SlaveState,
        origin: &str,
        op: Push,
        msg: RingMsg,
    ) -> StoreResult {
        let version = msg.version;
        let ring = Bytes::from(msg.ring);
        let builder = Bytes::from(msg.builder);
        let mut errors = Vec::new();

        let saved = match op {
            Push::Store => self.store.save_ring(version, ring.clone()).await,
            Push::Setup => self.store.replace_ring(version, ring.clone()).await,
        };
        let ring_ok = match saved {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("ring: {e}"));
                false
            }
        };
        let saved = match op {
            Push::Store => self.store.save_builder(version, builder.clone()).await,
            Push::Setup => self.store.replace_builder(version, builder.clone()).await,
        };
        let builder_ok = match saved {
            Ok(()) => true,
            Err(e) => {
                errors.push(format!("builder: {e}"));
                false
            }
        };

        if ring_ok && builder_ok {
            let activated = match self.store.set_current(version).await {
                Ok(_) => decode(&self.store, version, &ring, &builder),
                Err(e) => Err(e.into()),
            };
            match activated {
                Ok(active) => {
                    state.current = Some(active);
                    state.master = origin.to_string();
                    if let Err(e) = self.store.prune(version).await {
                        warn!(version, "failed to prune old ring versions: {e}");
                    }
                }
                Err(e) => errors.push(format!("activate: {e}")),
            }
        }

        let err_msg = errors.join("; ");
        if err_msg.is_empty() {
            info!(version, op = op.name(), master = %origin, "slave accepted ring");
        } else {
            warn!(
                version,
                op = op.name(),
                master = %origin,
                ring = ring_ok,
                builder = builder_ok,
                error = %err_msg,
                "slave did not fully accept ring"
            );
        }
        StoreResult {
            version,
            ring: ring_ok,
            builder: builder_ok,
            err_msg,
        }
    }
}

fn current_version(state: &SlaveState) -> RingVersion {
    state.current.as_ref().map_or(0, |a| a.version)
}

fn decode(
    store: &RingStore,
    version: RingVersion,
    ring: &[u8],
    builder: &[u8],
) -> Result<Active, ClusterError> {
    Ok(Active {
        version,
        ring: store.codec().load_ring(ring)?,
        builder: store.codec().load_builder(builder)?,
    })
}
