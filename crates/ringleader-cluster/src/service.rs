//! Dispatch of inbound [`RingMessage`]s to the master or slave service.
//!
//! Mutations always answer with a [`RingStatus`](ringleader_types::RingStatus)
//! so callers can tell "nothing changed" (status false, unchanged version,
//! error kind set) apart from "changed but not fully distributed" (status
//! false, new version, [`ErrorKind::QuorumFailed`]). Queries and slave operations
//! answer with [`RingMessage::Error`] on failure.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ringleader_net::{MessageHandler, RingMessage};
use ringleader_types::{ErrorKind, RpcError};
use tracing::{debug, warn};

use crate::change::Change;
use crate::dist::RingDist;
use crate::mgr::RingMgr;

/// The service a daemon exposes, chosen by its role.
pub enum RingService {
    Master(Arc<RingMgr>),
    Slave(Arc<RingDist>),
}

impl fmt::Debug for RingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingService::Master(_) => f.write_str("RingService::Master"),
            RingService::Slave(_) => f.write_str("RingService::Slave"),
        }
    }
}

#[async_trait]
impl MessageHandler for RingService {
    async fn handle(&self, peer: SocketAddr, request: RingMessage) -> RingMessage {
        let kind = request.kind();
        let response = match self {
            RingService::Master(mgr) => handle_master(mgr, request).await,
            RingService::Slave(dist) => handle_slave(dist, peer, request).await,
        };
        if let RingMessage::Error(e) = &response {
            debug!(%peer, request = kind, error = %e.message, "request failed");
        }
        response
    }
}

async fn handle_master(mgr: &RingMgr, request: RingMessage) -> RingMessage {
    let change = match request {
        RingMessage::AddNode(node) => Change::AddNode(node),
        RingMessage::RemoveNode { id } => Change::RemoveNode(id),
        RingMessage::ModNode(msg) => Change::ModNode(msg),
        RingMessage::SetConf(conf) => Change::SetConf(conf),
        RingMessage::SetActive { id } => Change::SetActive(id),
        RingMessage::RevertRing { version } => Change::Revert(version),
        RingMessage::SyncSlaves => Change::SyncSlaves,

        RingMessage::GetVersion => return RingMessage::RingStatus(mgr.get_version().await),
        RingMessage::GetGlobalConfig => return RingMessage::RingConf(mgr.get_global_config().await),
        RingMessage::GetNodeConfig { id } => {
            return match mgr.get_node_config(id).await {
                Ok(conf) => RingMessage::RingConf(conf),
                Err(e) => RingMessage::Error(e.to_rpc()),
            };
        }
        RingMessage::SearchNodes(query) => {
            return RingMessage::SearchResult(mgr.search_nodes(&query).await);
        }
        RingMessage::GetRing => return RingMessage::Ring(mgr.get_ring().await),
        RingMessage::RegisterNode(req) => {
            return match mgr.register_node(req).await {
                Ok(config) => RingMessage::NodeConfig(config),
                Err(e) => RingMessage::Error(e.to_rpc()),
            };
        }
        RingMessage::ClusterStatus => return RingMessage::ClusterReport(mgr.cluster_status().await),

        other => return unsupported("master", &other),
    };
    RingMessage::RingStatus(mgr.mutation_status(change).await)
}

async fn handle_slave(dist: &RingDist, peer: SocketAddr, request: RingMessage) -> RingMessage {
    let origin = peer.ip().to_string();
    let result = match request {
        RingMessage::Store(msg) => dist.store(&origin, msg).await,
        RingMessage::Setup(msg) => Ok(dist.setup(&origin, msg).await),
        RingMessage::Revert(msg) => dist.revert(&origin, msg.version).await,
        RingMessage::Status(req) => return RingMessage::StatusReport(dist.status(req).await),
        other => return unsupported("slave", &other),
    };
    match result {
        Ok(result) => RingMessage::StoreResult(result),
        Err(e) => RingMessage::Error(e.to_rpc()),
    }
}

fn unsupported(role: &str, request: &RingMessage) -> RingMessage {
    warn!(role, request = request.kind(), "unsupported request");
    RingMessage::Error(RpcError::new(
        ErrorKind::Internal,
        format!("{} is not served by a {role}", request.kind()),
    ))
}
