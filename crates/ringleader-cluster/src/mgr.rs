//! The master's RingMgr service.
//!
//! Mutations are submitted to the change pipeline and wait for its verdict.
//! Queries read the published snapshot directly and never queue behind a
//! pending mutation.

use std::sync::Arc;

use bytes::Bytes;
use ringleader_ring::RingBuilder;
use ringleader_store::RingStore;
use ringleader_types::{
    Conf, ModifyMsg, Node, NodeConfig, NodeId, RegisterRequest, RingBlob, RingConf, RingMsg,
    RingStatus, RingVersion, SearchResult, SlaveReport, StatusRequest,
};
use tracing::{info, warn};

use crate::change::{self, Applied, Change, ChangeHandle};
use crate::distribution::DistributionClient;
use crate::error::ClusterError;
use crate::filters::AdmissionFilters;
use crate::registry::{NodeRegistry, search_nodes};
use crate::state::{RingSnapshot, RingState};

/// Master-side service: membership mutations and ring queries.
pub struct RingMgr {
    state: Arc<RingState>,
    changes: ChangeHandle,
    dist: Arc<DistributionClient>,
}

impl RingMgr {
    /// Write an empty version-1 pair if `store` holds no ring yet.
    ///
    /// Returns the version that is current afterwards.
    pub async fn init_store(
        store: &RingStore,
        replicas: u8,
        vnodes_per_node: u16,
    ) -> Result<RingVersion, ClusterError> {
        if let Some(version) = store.highest_version().await? {
            warn!(version, "ring directory already initialized");
            return Ok(version);
        }
        let mut builder = RingBuilder::new(replicas, vnodes_per_node);
        builder.set_version(1);
        let rendered = store.codec().render(&builder)?;
        store
            .save(
                rendered.version,
                Bytes::from(rendered.ring),
                Bytes::from(rendered.builder),
            )
            .await?;
        info!(version = rendered.version, "initialized empty ring");
        Ok(rendered.version)
    }

    /// Load the current ring, register every slave and start serving.
    ///
    /// Fails if no consistent ring is on disk or if more than half of the
    /// slaves cannot be registered. Both are fatal for a master.
    pub async fn start(
        store: Arc<RingStore>,
        filters: Arc<AdmissionFilters>,
        dist: Arc<DistributionClient>,
    ) -> Result<Self, ClusterError> {
        let pair = store.load().await?;
        let mut builder = store.codec().load_builder(&pair.builder)?;
        let high_water = store
            .highest_version()
            .await?
            .map_or(pair.version, |v| v.max(pair.version));
        // A reverted master may have issued ids in versions newer than the
        // current one.
        builder.reserve_ids_through(highest_node_id(&store).await?);
        info!(
            version = pair.version,
            high_water,
            nodes = builder.node_count(),
            last_node_id = builder.last_node_id(),
            "loaded ring"
        );

        dist.register_slaves(RingMsg {
            version: pair.version,
            ring: pair.ring.to_vec(),
            builder: pair.builder.to_vec(),
        })
        .await?;

        let state = RingState::new(RingSnapshot {
            version: pair.version,
            ring: pair.ring,
            builder_bytes: pair.builder,
            builder: builder.clone(),
        });
        let registry = NodeRegistry::new(builder, filters);
        let changes = change::start(registry, store, dist.clone(), state.clone(), high_water);

        Ok(Self {
            state,
            changes,
            dist,
        })
    }

    pub fn state(&self) -> &Arc<RingState> {
        &self.state
    }

    /// Current version.
    pub async fn version(&self) -> RingVersion {
        self.state.version().await
    }

    /// Stop the change pipeline.
    pub fn shutdown(&self) {
        self.changes.abort();
    }

    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    pub async fn add_node(&self, node: Node) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::AddNode(node)).await
    }

    pub async fn remove_node(&self, id: NodeId) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::RemoveNode(id)).await
    }

    pub async fn mod_node(&self, msg: ModifyMsg) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::ModNode(msg)).await
    }

    pub async fn set_conf(&self, conf: Conf) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::SetConf(conf)).await
    }

    pub async fn set_active(&self, id: NodeId) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::SetActive(id)).await
    }

    /// Restore a retained version as current on the master and all slaves.
    pub async fn revert_ring(&self, version: RingVersion) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::Revert(version)).await
    }

    /// Re-push the current pair to slaves whose version differs.
    pub async fn sync_slaves(&self) -> Result<RingStatus, ClusterError> {
        self.mutate(Change::SyncSlaves).await
    }

    /// Admit a self-registering node and return its id together with the
    /// ring that includes it.
    pub async fn register_node(&self, req: RegisterRequest) -> Result<NodeConfig, ClusterError> {
        let hostname = req.hostname.clone();
        let Applied { status, node, ring } = self.changes.submit(Change::RegisterNode(req)).await?;
        let localid = node.map(|n| n.id).unwrap_or_default();
        if !status.status {
            warn!(
                localid,
                hostname = %hostname,
                version = status.version,
                "node registered but ring not accepted by a slave quorum: {}",
                status.msg
            );
        }
        info!(localid, hostname = %hostname, version = status.version, "node registered");
        Ok(NodeConfig {
            localid,
            ring: ring.to_vec(),
        })
    }

    async fn mutate(&self, change: Change) -> Result<RingStatus, ClusterError> {
        Ok(self.changes.submit(change).await?.status)
    }

    /// Run a mutation and answer with a status either way.
    ///
    /// A refused change reports the version current at the moment the
    /// pipeline refused it, not whatever a later change has published since.
    pub async fn mutation_status(&self, change: Change) -> RingStatus {
        match self.changes.try_submit(change).await {
            Ok(applied) => applied.status,
            Err(rejected) => rejected.into_status(),
        }
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    pub async fn get_version(&self) -> RingStatus {
        RingStatus {
            status: true,
            version: self.version().await,
            ..Default::default()
        }
    }

    pub async fn get_ring(&self) -> RingBlob {
        let snapshot = self.state.snapshot().await;
        RingBlob {
            version: snapshot.version,
            ring: snapshot.ring.to_vec(),
        }
    }

    pub async fn get_global_config(&self) -> RingConf {
        let snapshot = self.state.snapshot().await;
        RingConf {
            status: RingStatus {
                status: true,
                version: snapshot.version,
                ..Default::default()
            },
            conf: Conf {
                conf: snapshot.builder.conf().to_vec(),
                restart_required: snapshot.builder.restart_required(),
            },
        }
    }

    pub async fn get_node_config(&self, id: NodeId) -> Result<RingConf, ClusterError> {
        let snapshot = self.state.snapshot().await;
        let node = snapshot.builder.node(id).ok_or(ClusterError::NotFound(id))?;
        Ok(RingConf {
            status: RingStatus {
                status: true,
                version: snapshot.version,
                ..Default::default()
            },
            conf: Conf {
                conf: node.conf.clone(),
                restart_required: snapshot.builder.restart_required(),
            },
        })
    }

    pub async fn search_nodes(&self, query: &Node) -> SearchResult {
        let snapshot = self.state.snapshot().await;
        SearchResult {
            nodes: search_nodes(snapshot.builder.nodes(), query),
        }
    }

    /// Status of every configured slave, for drift detection.
    pub async fn cluster_status(&self) -> Vec<SlaveReport> {
        self.dist
            .status_all(StatusRequest {
                ring: true,
                builder: true,
            })
            .await
    }
}

/// Highest node id recorded in any retained builder.
async fn highest_node_id(store: &RingStore) -> Result<NodeId, ClusterError> {
    let mut highest = 0;
    for version in store.versions().await? {
        let pair = match store.load_version(version).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(version, "skipping unreadable retained version: {e}");
                continue;
            }
        };
        match store.codec().load_builder(&pair.builder) {
            Ok(builder) => highest = highest.max(builder.last_node_id()),
            Err(e) => warn!(version, "skipping undecodable retained builder: {e}"),
        }
    }
    Ok(highest)
}
