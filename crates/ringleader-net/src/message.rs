//! Protocol messages for the ringleader network layer.
//!
//! All messages are serialized with postcard and framed with a 4-byte
//! big-endian length prefix.

use ringleader_types::{
    Conf, ModifyMsg, Node, NodeConfig, NodeId, RegisterRequest, RingBlob, RingConf, RingMsg,
    RingStatus, RingVersion, RpcError, SearchResult, SlaveReport, StatusMsg, StatusRequest,
    StoreResult,
};
use serde::{Deserialize, Serialize};

/// Protocol messages exchanged between ringleader processes.
///
/// One connection carries exactly one request followed by one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingMessage {
    // --- RingMgr requests (master) ---
    /// Add a node. `id == 0` asks the master to allocate one.
    AddNode(Node),
    RemoveNode {
        id: NodeId,
    },
    ModNode(ModifyMsg),
    SetConf(Conf),
    SetActive {
        id: NodeId,
    },
    GetVersion,
    GetGlobalConfig,
    GetNodeConfig {
        id: NodeId,
    },
    SearchNodes(Node),
    GetRing,
    RegisterNode(RegisterRequest),
    /// Restore a retained version as current, cluster-wide.
    RevertRing {
        version: RingVersion,
    },
    /// Fetch every slave's status.
    ClusterStatus,
    /// Re-push the current pair to slaves that drifted.
    SyncSlaves,

    // --- RingMgr responses ---
    RingStatus(RingStatus),
    RingConf(RingConf),
    NodeConfig(NodeConfig),
    SearchResult(SearchResult),
    Ring(RingBlob),
    ClusterReport(Vec<SlaveReport>),

    // --- RingDist requests (slave) ---
    Store(RingMsg),
    Revert(RingMsg),
    Setup(RingMsg),
    Status(StatusRequest),

    // --- RingDist responses ---
    StoreResult(StoreResult),
    StatusReport(StatusMsg),

    /// Failure answer to any request.
    Error(RpcError),
}

impl RingMessage {
    /// Short name of the variant, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RingMessage::AddNode(_) => "AddNode",
            RingMessage::RemoveNode { .. } => "RemoveNode",
            RingMessage::ModNode(_) => "ModNode",
            RingMessage::SetConf(_) => "SetConf",
            RingMessage::SetActive { .. } => "SetActive",
            RingMessage::GetVersion => "GetVersion",
            RingMessage::GetGlobalConfig => "GetGlobalConfig",
            RingMessage::GetNodeConfig { .. } => "GetNodeConfig",
            RingMessage::SearchNodes(_) => "SearchNodes",
            RingMessage::GetRing => "GetRing",
            RingMessage::RegisterNode(_) => "RegisterNode",
            RingMessage::RevertRing { .. } => "RevertRing",
            RingMessage::ClusterStatus => "ClusterStatus",
            RingMessage::SyncSlaves => "SyncSlaves",
            RingMessage::RingStatus(_) => "RingStatus",
            RingMessage::RingConf(_) => "RingConf",
            RingMessage::NodeConfig(_) => "NodeConfig",
            RingMessage::SearchResult(_) => "SearchResult",
            RingMessage::Ring(_) => "Ring",
            RingMessage::ClusterReport(_) => "ClusterReport",
            RingMessage::Store(_) => "Store",
            RingMessage::Revert(_) => "Revert",
            RingMessage::Setup(_) => "Setup",
            RingMessage::Status(_) => "Status",
            RingMessage::StoreResult(_) => "StoreResult",
            RingMessage::StatusReport(_) => "StatusReport",
            RingMessage::Error(_) => "Error",
        }
    }
}
