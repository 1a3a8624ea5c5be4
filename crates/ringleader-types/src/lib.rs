//! Shared types for the ringleader control plane.
//!
//! This crate defines the membership data model ([`Node`]) and the request /
//! response shapes of the two RPC surfaces:
//!
//! - **RingMgr** (served by the master): [`ModifyMsg`], [`Conf`],
//!   [`RingStatus`], [`RingConf`], [`RegisterRequest`], [`NodeConfig`],
//!   [`RingBlob`], [`SearchResult`].
//! - **RingDist** (served by every slave): [`RingMsg`], [`StoreResult`],
//!   [`StatusRequest`], [`StatusMsg`].
//!
//! Errors crossing the wire are carried as [`RpcError`] tagged with an
//! [`ErrorKind`], so callers can react to the failure class without parsing
//! strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a storage node, unique within a ring.
pub type NodeId = u64;

/// Monotonically increasing identifier of a (ring, builder) pair.
pub type RingVersion = u64;

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// A storage node as tracked by the master's registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id. `0` means "unassigned" in requests.
    pub id: NodeId,
    /// Whether the node takes part in placement.
    pub active: bool,
    /// Relative capacity; drives the node's weight on the ring.
    pub capacity: u32,
    /// Ordered set of tiers (failure domains) the node belongs to.
    pub tiers: Vec<String>,
    /// Ordered list of `host:port` addresses.
    pub addresses: Vec<String>,
    /// Free-form operator metadata (the hostname for registered nodes).
    pub meta: String,
    /// Opaque per-node configuration.
    pub conf: Vec<u8>,
}

impl Node {
    /// Remove duplicate tiers while keeping their first-seen order.
    pub fn dedup_tiers(&mut self) {
        let mut seen = Vec::with_capacity(self.tiers.len());
        self.tiers.retain(|t| {
            if seen.contains(t) {
                false
            } else {
                seen.push(t.clone());
                true
            }
        });
    }

    /// Return true if no field is set, i.e. the node matches nothing as a search query.
    pub fn is_empty_query(&self) -> bool {
        self.id == 0 && self.addresses.is_empty() && self.tiers.is_empty() && self.meta.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RingMgr surface
// ---------------------------------------------------------------------------

/// Update of a single mutable node attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyMsg {
    /// Target node.
    pub id: NodeId,
    /// Attribute name (`capacity`, `tiers`, `addresses`, `meta`, `conf`, `active`).
    pub key: String,
    /// New value in its textual form.
    pub value: String,
}

/// Global ring configuration update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conf {
    pub conf: Vec<u8>,
    /// Whether nodes must restart to pick up the new configuration.
    pub restart_required: bool,
}

/// Outcome of one slave during a distribution round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveOutcome {
    /// Slave endpoint as configured on the master.
    pub slave: String,
    pub accepted_ring: bool,
    pub accepted_builder: bool,
    /// Version the slave reported back (0 if it never answered).
    pub version: RingVersion,
    /// Error text; empty on success.
    pub error: String,
}

impl SlaveOutcome {
    /// A push counts towards quorum only if both artifacts were accepted.
    pub fn accepted(&self) -> bool {
        self.accepted_ring && self.accepted_builder && self.error.is_empty()
    }
}

/// Result of every mutating RingMgr call.
///
/// `version` is the resulting ring version, or the unchanged one when the
/// mutation was rejected. `status == false` with a changed version means the
/// change was persisted but not accepted by a quorum of slaves; `kind` is
/// then [`ErrorKind::QuorumFailed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStatus {
    pub status: bool,
    pub version: RingVersion,
    pub msg: String,
    /// Failure class when `status` is false.
    pub kind: Option<ErrorKind>,
    pub slaves: Vec<SlaveOutcome>,
}

/// Response carrying configuration bytes (global or per node).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConf {
    pub status: RingStatus,
    pub conf: Conf,
}

/// Self-registration request sent by a joining storage node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub addrs: Vec<String>,
    pub tiers: Vec<String>,
}

/// Answer to a registration: the new node id and the freshly rendered ring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub localid: NodeId,
    pub ring: Vec<u8>,
}

/// A serialized ring together with its version tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBlob {
    pub version: RingVersion,
    pub ring: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub nodes: Vec<Node>,
}

/// One row of a cluster-wide status sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveReport {
    pub slave: String,
    /// The slave's status, or the error that prevented fetching it.
    pub status: Result<StatusMsg, String>,
}

// ---------------------------------------------------------------------------
// RingDist surface
// ---------------------------------------------------------------------------

/// A (ring, builder) pair pushed to, or selected on, a slave.
///
/// `Revert` only looks at `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingMsg {
    pub version: RingVersion,
    pub ring: Vec<u8>,
    pub builder: Vec<u8>,
}

/// Slave answer to `Store`, `Revert` and `Setup`.
///
/// The two flags report independently whether the ring and the builder were
/// accepted, so a partially applied push is visible to the master.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResult {
    pub version: RingVersion,
    pub ring: bool,
    pub builder: bool,
    pub err_msg: String,
}

/// Selects which health texts a `Status` call should include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub ring: bool,
    pub builder: bool,
}

/// Slave status report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMsg {
    /// Active version; 0 while uninitialized.
    pub version: RingVersion,
    pub ringstats: String,
    pub builderstats: String,
    /// Address of the master that last pushed to this slave.
    pub master: String,
}

// ---------------------------------------------------------------------------
// Errors on the wire
// ---------------------------------------------------------------------------

/// Failure classes that survive serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    FilterRejected,
    UnknownField,
    InvalidValue,
    VersionNotFound,
    NoRingFound,
    NoMatchingRing,
    QuorumFailed,
    StaleVersion,
    /// Anything else (I/O, codec, transport, shutdown).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::DuplicateId => "duplicate id",
            ErrorKind::FilterRejected => "filter rejected",
            ErrorKind::UnknownField => "unknown field",
            ErrorKind::InvalidValue => "invalid value",
            ErrorKind::VersionNotFound => "version not found",
            ErrorKind::NoRingFound => "no ring found",
            ErrorKind::NoMatchingRing => "no matching ring",
            ErrorKind::QuorumFailed => "quorum failed",
            ErrorKind::StaleVersion => "stale version",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Structured error returned by either RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RpcError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
