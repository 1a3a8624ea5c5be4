//! Rendered consistent-hash ring.

use std::collections::BTreeMap;

use ringleader_types::{Node, NodeId, RingVersion};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Capacity that maps to exactly `vnodes_per_node` vnodes.
pub const BASE_CAPACITY: u32 = 1000;

/// Immutable ring artifact for one version.
///
/// Holds the full membership snapshot it was rendered from (inactive nodes
/// included, so operators see them) and the vnode placement of the active
/// ones. Lookups walk clockwise from a key's position until enough distinct
/// physical nodes are found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ring {
    version: RingVersion,
    conf: Vec<u8>,
    restart_required: bool,
    replicas: u8,
    vnodes_per_node: u16,
    nodes: BTreeMap<NodeId, Node>,
    /// Virtual node positions: ring position -> physical node.
    ///
    /// Derived from `nodes`, never serialized.
    #[serde(skip)]
    vnodes: BTreeMap<u64, NodeId>,
}

impl Ring {
    pub(crate) fn new(
        version: RingVersion,
        conf: Vec<u8>,
        restart_required: bool,
        replicas: u8,
        vnodes_per_node: u16,
        nodes: BTreeMap<NodeId, Node>,
    ) -> Self {
        let mut ring = Self {
            version,
            conf,
            restart_required,
            replicas,
            vnodes_per_node,
            nodes,
            vnodes: BTreeMap::new(),
        };
        ring.place_vnodes();
        ring
    }

    /// Recompute vnode positions from the membership table.
    pub(crate) fn place_vnodes(&mut self) {
        self.vnodes.clear();
        for node in self.nodes.values() {
            if !node.active {
                continue;
            }
            let weight = node_weight(node.capacity, self.vnodes_per_node);
            for i in 0..weight {
                self.vnodes.insert(vnode_position(node.id, i), node.id);
            }
        }
        debug!(
            version = self.version,
            nodes = self.nodes.len(),
            vnodes = self.vnodes.len(),
            "placed ring vnodes"
        );
    }

    pub fn version(&self) -> RingVersion {
        self.version
    }

    /// Global configuration bytes carried by this version.
    pub fn conf(&self) -> &[u8] {
        &self.conf
    }

    pub fn restart_required(&self) -> bool {
        self.restart_required
    }

    /// Default replica count used by [`Ring::owners`].
    pub fn replicas(&self) -> u8 {
        self.replicas
    }

    /// Return info about a specific node, if present.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// All nodes of the membership snapshot, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Return the number of physical nodes in the ring.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn active_count(&self) -> usize {
        self.nodes.values().filter(|n| n.active).count()
    }

    /// Return the total number of vnodes in the ring.
    pub fn vnode_count(&self) -> usize {
        self.vnodes.len()
    }

    /// Determine which nodes own a key.
    ///
    /// Walks clockwise from the key's position on the ring, collecting
    /// `replicas` distinct physical node IDs. If fewer distinct active
    /// nodes exist, returns all of them.
    pub fn owners(&self, key: &[u8], replicas: usize) -> Vec<NodeId> {
        if self.vnodes.is_empty() {
            return Vec::new();
        }

        let pos = key_position(key);
        let mut owners = Vec::with_capacity(replicas);
        let max_distinct = replicas.min(self.active_count());

        // BTreeMap::range gives us everything >= pos, then we wrap around.
        let after = self.vnodes.range(pos..);
        let before = self.vnodes.range(..pos);

        for (_, node_id) in after.chain(before) {
            if !owners.contains(node_id) {
                owners.push(*node_id);
                if owners.len() == max_distinct {
                    break;
                }
            }
        }

        owners
    }

    /// One-line health summary reported by slaves.
    pub fn stats(&self) -> String {
        format!(
            "version={} nodes={} active={} vnodes={} replicas={}",
            self.version,
            self.nodes.len(),
            self.active_count(),
            self.vnodes.len(),
            self.replicas
        )
    }
}

/// Number of vnodes for a node of the given capacity (0 for capacity 0).
fn node_weight(capacity: u32, vnodes_per_node: u16) -> u16 {
    if capacity == 0 {
        return 0;
    }
    let w = u64::from(capacity) * u64::from(vnodes_per_node) / u64::from(BASE_CAPACITY);
    w.clamp(1, u64::from(u16::MAX)) as u16
}

/// Compute a vnode's position on the ring: blake3(node_id ++ vnode_index) truncated to u64.
fn vnode_position(node_id: NodeId, vnode_index: u16) -> u64 {
    let mut input = [0u8; 10];
    input[..8].copy_from_slice(&node_id.to_le_bytes());
    input[8..].copy_from_slice(&vnode_index.to_le_bytes());
    first_u64(blake3::hash(&input))
}

fn key_position(key: &[u8]) -> u64 {
    first_u64(blake3::hash(key))
}

fn first_u64(hash: blake3::Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
