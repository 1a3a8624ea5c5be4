//! Typed client for the master's RingMgr surface.

use ringleader_types::{
    Conf, ModifyMsg, Node, NodeConfig, NodeId, RegisterRequest, RingBlob, RingConf, RingStatus,
    RingVersion, SearchResult, SlaveReport,
};

use crate::error::NetError;
use crate::message::RingMessage;
use crate::transport::{TcpTransport, unexpected};

/// Talks to one master over [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct RingMgrClient {
    transport: TcpTransport,
    addr: String,
}

impl RingMgrClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_transport(TcpTransport::new(), addr)
    }

    pub fn with_transport(transport: TcpTransport, addr: impl Into<String>) -> Self {
        Self {
            transport,
            addr: addr.into(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn add_node(&self, node: Node) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::AddNode(node)).await
    }

    pub async fn remove_node(&self, id: NodeId) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::RemoveNode { id }).await
    }

    pub async fn mod_node(&self, msg: ModifyMsg) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::ModNode(msg)).await
    }

    pub async fn set_conf(&self, conf: Conf) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::SetConf(conf)).await
    }

    pub async fn set_active(&self, id: NodeId) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::SetActive { id }).await
    }

    pub async fn get_version(&self) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::GetVersion).await
    }

    pub async fn revert_ring(&self, version: RingVersion) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::RevertRing { version }).await
    }

    pub async fn sync_slaves(&self) -> Result<RingStatus, NetError> {
        self.ring_status(RingMessage::SyncSlaves).await
    }

    pub async fn get_global_config(&self) -> Result<RingConf, NetError> {
        self.ring_conf(RingMessage::GetGlobalConfig).await
    }

    pub async fn get_node_config(&self, id: NodeId) -> Result<RingConf, NetError> {
        self.ring_conf(RingMessage::GetNodeConfig { id }).await
    }

    pub async fn search_nodes(&self, query: Node) -> Result<SearchResult, NetError> {
        match self.call(RingMessage::SearchNodes(query)).await? {
            RingMessage::SearchResult(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_ring(&self) -> Result<RingBlob, NetError> {
        match self.call(RingMessage::GetRing).await? {
            RingMessage::Ring(ring) => Ok(ring),
            other => Err(unexpected(other)),
        }
    }

    /// Register this host; returns its node id and the ring to boot from.
    pub async fn register_node(&self, req: RegisterRequest) -> Result<NodeConfig, NetError> {
        match self.call(RingMessage::RegisterNode(req)).await? {
            RingMessage::NodeConfig(config) => Ok(config),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cluster_status(&self) -> Result<Vec<SlaveReport>, NetError> {
        match self.call(RingMessage::ClusterStatus).await? {
            RingMessage::ClusterReport(reports) => Ok(reports),
            other => Err(unexpected(other)),
        }
    }

    async fn call(&self, msg: RingMessage) -> Result<RingMessage, NetError> {
        self.transport.request(&self.addr, &msg).await
    }

    async fn ring_status(&self, msg: RingMessage) -> Result<RingStatus, NetError> {
        match self.call(msg).await? {
            RingMessage::RingStatus(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    async fn ring_conf(&self, msg: RingMessage) -> Result<RingConf, NetError> {
        match self.call(msg).await? {
            RingMessage::RingConf(conf) => Ok(conf),
            other => Err(unexpected(other)),
        }
    }
}
