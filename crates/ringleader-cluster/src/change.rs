//! The change pipeline.
//!
//! Every ring-mutating request is sent to a single worker task over a
//! bounded channel of depth 1 and processed strictly in arrival order:
//!
//! ```text
//! Queued -> Applying -> Rendering -> Persisting -> Distributing -> Acked
//!                \            \            \
//!                 `------------`------------`--> Failed
//! ```
//!
//! The worker owns the [`NodeRegistry`] and applies each change to a clone
//! of it. The clone replaces the live registry only once the new version is
//! on disk, so a render or persistence failure leaves memory at the last
//! persisted version. A request that reached the worker always runs to a
//! terminal state, even if the caller stopped waiting.

use std::sync::Arc;

use bytes::Bytes;
use ringleader_store::RingStore;
use ringleader_types::{
    Conf, ModifyMsg, Node, NodeId, RegisterRequest, RingMsg, RingStatus, RingVersion,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::distribution::DistributionClient;
use crate::error::ClusterError;
use crate::registry::NodeRegistry;
use crate::state::{RingSnapshot, RingState};

/// A queued unit of work.
#[derive(Debug, Clone)]
pub enum Change {
    AddNode(Node),
    RemoveNode(NodeId),
    ModNode(ModifyMsg),
    SetConf(Conf),
    SetActive(NodeId),
    RegisterNode(RegisterRequest),
    /// Make a retained version current again, here and on every slave.
    Revert(RingVersion),
    /// Re-push the current pair to slaves that drifted.
    SyncSlaves,
}

impl Change {
    pub fn name(&self) -> &'static str {
        match self {
            Change::AddNode(_) => "add_node",
            Change::RemoveNode(_) => "remove_node",
            Change::ModNode(_) => "mod_node",
            Change::SetConf(_) => "set_conf",
            Change::SetActive(_) => "set_active",
            Change::RegisterNode(_) => "register_node",
            Change::Revert(_) => "revert",
            Change::SyncSlaves => "sync_slaves",
        }
    }
}

/// Terminal result of an accepted change.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Resulting version and per-slave outcomes. `status.status` is false
    /// when the version was persisted but did not reach a slave quorum.
    pub status: RingStatus,
    /// The node as stored, for `AddNode` and `RegisterNode`.
    pub node: Option<Node>,
    /// The ring current after this change.
    pub ring: Bytes,
}

/// A change the worker refused.
#[derive(Debug)]
pub struct Rejected {
    /// Version current when the change was refused.
    pub version: RingVersion,
    pub error: ClusterError,
}

impl Rejected {
    /// Status answer for a refused mutation: nothing changed.
    pub fn into_status(self) -> RingStatus {
        RingStatus {
            status: false,
            version: self.version,
            msg: self.error.to_string(),
            kind: Some(self.error.kind()),
            slaves: Vec::new(),
        }
    }
}

struct ChangeRequest {
    change: Change,
    reply: oneshot::Sender<Result<Applied, Rejected>>,
}

/// Handle to the running change worker.
pub struct ChangeHandle {
    tx: mpsc::Sender<ChangeRequest>,
    task: tokio::task::JoinHandle<()>,
    state: Arc<RingState>,
}

impl ChangeHandle {
    /// Enqueue a change and wait until it is acked or failed.
    ///
    /// Blocks while another change occupies the queue.
    pub async fn submit(&self, change: Change) -> Result<Applied, ClusterError> {
        self.try_submit(change).await.map_err(|r| r.error)
    }

    /// Like [`submit`](Self::submit), but a refusal carries the version
    /// that was current when the worker refused the change.
    pub async fn try_submit(&self, change: Change) -> Result<Applied, Rejected> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ChangeRequest { change, reply }).await.is_err() {
            return Err(self.stopped().await);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(self.stopped().await),
        }
    }

    async fn stopped(&self) -> Rejected {
        Rejected {
            version: self.state.version().await,
            error: ClusterError::ServiceStopped,
        }
    }

    /// Abort the worker task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Check whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

struct ChangeManager {
    registry: NodeRegistry,
    store: Arc<RingStore>,
    dist: Arc<DistributionClient>,
    state: Arc<RingState>,
    /// Highest version ever persisted or attempted. New versions start above it.
    high_water: RingVersion,
}

/// Start the change worker.
///
/// `registry` must reflect the snapshot currently published in `state`;
/// `high_water` is the highest version present in `store`.
pub fn start(
    registry: NodeRegistry,
    store: Arc<RingStore>,
    dist: Arc<DistributionClient>,
    state: Arc<RingState>,
    high_water: RingVersion,
) -> ChangeHandle {
    let (tx, rx) = mpsc::channel(1);
    let manager = ChangeManager {
        registry,
        store,
        dist,
        state: state.clone(),
        high_water,
    };
    let task = tokio::spawn(manager.run(rx));
    ChangeHandle { tx, task, state }
}

impl ChangeManager {
    async fn run(mut self, mut rx: mpsc::Receiver<ChangeRequest>) {
        info!(high_water = self.high_water, "change manager started");
        while let Some(ChangeRequest { change, reply }) = rx.recv().await {
            let name = change.name();
            debug!(change = name, "applying change");
            let result = match self.apply(change).await {
                Ok(applied) => Ok(applied),
                Err(error) => {
                    debug!(change = name, "change failed: {error}");
                    Err(Rejected {
                        version: self.state.version().await,
                        error,
                    })
                }
            };
            if reply.send(result).is_err() {
                debug!(change = name, "caller went away before the change finished");
            }
        }
        info!("change manager stopped");
    }

    async fn apply(&mut self, change: Change) -> Result<Applied, ClusterError> {
        let name = change.name();
        let mut working = self.registry.clone();
        let node = match change {
            Change::Revert(version) => return self.revert(version).await,
            Change::SyncSlaves => return self.sync().await,
            Change::AddNode(node) => Some(working.add(node)?),
            Change::RegisterNode(req) => Some(working.register(req)?),
            Change::RemoveNode(id) => {
                working.remove(id)?;
                None
            }
            Change::ModNode(msg) => {
                working.modify(&msg)?;
                None
            }
            Change::SetConf(conf) => {
                working.set_conf(conf.conf, conf.restart_required);
                None
            }
            Change::SetActive(id) => {
                working.set_active(id)?;
                None
            }
        };
        self.commit(name, working, node).await
    }

    /// Render, persist, publish and distribute `working` as a new version.
    async fn commit(
        &mut self,
        name: &'static str,
        mut working: NodeRegistry,
        node: Option<Node>,
    ) -> Result<Applied, ClusterError> {
        if !working.is_dirty() {
            let snapshot = self.state.snapshot().await;
            return Ok(Applied {
                status: RingStatus {
                    status: true,
                    version: snapshot.version,
                    msg: "no change".into(),
                    ..Default::default()
                },
                node,
                ring: snapshot.ring.clone(),
            });
        }

        let version = self.high_water + 1;
        working.set_version(version);
        let rendered = self.store.codec().render(working.builder())?;
        let ring = Bytes::from(rendered.ring);
        let builder = Bytes::from(rendered.builder);

        if let Err(e) = self.store.save(version, ring.clone(), builder.clone()).await {
            // Artifacts of this version may be partly on disk; never hand it out again.
            self.high_water = version;
            error!(version, change = name, "failed to persist ring: {e}");
            return Err(e.into());
        }

        working.clear_dirty();
        self.high_water = version;
        self.state
            .publish(RingSnapshot {
                version,
                ring: ring.clone(),
                builder_bytes: builder.clone(),
                builder: working.builder().clone(),
            })
            .await;
        self.registry = working;
        info!(version, change = name, "change accepted");

        let report = self
            .dist
            .store_all(RingMsg {
                version,
                ring: ring.to_vec(),
                builder: builder.to_vec(),
            })
            .await;
        Ok(Applied {
            status: report.into_status(),
            node,
            ring,
        })
    }

    async fn revert(&mut self, version: RingVersion) -> Result<Applied, ClusterError> {
        let pair = self.store.load_version(version).await?;
        let mut builder = self.store.codec().load_builder(&pair.builder)?;
        self.store.set_current(version).await?;

        // Ids issued after `version` stay retired.
        builder.reserve_ids_through(self.registry.builder().last_node_id());
        self.registry = NodeRegistry::new(builder.clone(), self.registry.filters().clone());
        self.state
            .publish(RingSnapshot {
                version,
                ring: pair.ring.clone(),
                builder_bytes: pair.builder,
                builder,
            })
            .await;
        warn!(version, "reverted ring");

        let report = self.dist.revert_all(version).await;
        Ok(Applied {
            status: report.into_status(),
            node: None,
            ring: pair.ring,
        })
    }

    async fn sync(&mut self) -> Result<Applied, ClusterError> {
        let snapshot = self.state.snapshot().await;
        let report = self
            .dist
            .sync_all(RingMsg {
                version: snapshot.version,
                ring: snapshot.ring.to_vec(),
                builder: snapshot.builder_bytes.to_vec(),
            })
            .await;
        Ok(Applied {
            status: report.into_status(),
            node: None,
            ring: snapshot.ring.clone(),
        })
    }
}
