//! Mutable ring builder.

use std::collections::BTreeMap;

use ringleader_types::{Node, NodeId, RingVersion};
use serde::{Deserialize, Serialize};

use crate::ring::Ring;

/// The working state a [`Ring`] is rendered from.
///
/// Besides the membership table, the builder remembers the highest node id
/// it ever handed out so ids are never reused after a node is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBuilder {
    version: RingVersion,
    last_node_id: NodeId,
    conf: Vec<u8>,
    restart_required: bool,
    replicas: u8,
    vnodes_per_node: u16,
    nodes: BTreeMap<NodeId, Node>,
}

impl RingBuilder {
    /// Create an empty builder at version 0.
    pub fn new(replicas: u8, vnodes_per_node: u16) -> Self {
        Self {
            version: 0,
            last_node_id: 0,
            conf: Vec::new(),
            restart_required: false,
            replicas,
            vnodes_per_node,
            nodes: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> RingVersion {
        self.version
    }

    pub fn set_version(&mut self, version: RingVersion) {
        self.version = version;
    }

    /// Highest node id ever issued by or inserted into this builder.
    pub fn last_node_id(&self) -> NodeId {
        self.last_node_id
    }

    /// Treat every id up to `id` as issued. Never lowers the mark.
    pub fn reserve_ids_through(&mut self, id: NodeId) {
        self.last_node_id = self.last_node_id.max(id);
    }

    /// Reserve and return the next node id.
    pub fn allocate_id(&mut self) -> NodeId {
        self.last_node_id += 1;
        self.last_node_id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert or replace a node, raising the id high-water mark if needed.
    pub fn insert(&mut self, node: Node) {
        self.last_node_id = self.last_node_id.max(node.id);
        self.nodes.insert(node.id, node);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn conf(&self) -> &[u8] {
        &self.conf
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    pub fn set_conf(&mut self, conf: Vec<u8>, restart_required: bool) {
        self.conf = conf;
        self.restart_required = restart_required;
    }

    pub fn replicas(&self) -> u8 {
        self.replicas
    }

    pub fn vnodes_per_node(&self) -> u16 {
        self.vnodes_per_node
    }

    /// Render the ring for the builder's current version.
    pub fn render(&self) -> Ring {
        Ring::new(
            self.version,
            self.conf.clone(),
            self.restart_required,
            self.replicas,
            self.vnodes_per_node,
            self.nodes.clone(),
        )
    }

    /// One-line health summary reported by slaves.
    pub fn stats(&self) -> String {
        format!(
            "version={} nodes={} last_id={} conf_bytes={} restart_required={}",
            self.version,
            self.nodes.len(),
            self.last_node_id,
            self.conf.len(),
            self.restart_required
        )
    }
}
