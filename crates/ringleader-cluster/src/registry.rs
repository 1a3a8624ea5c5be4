//! Authoritative membership table.
//!
//! [`NodeRegistry`] wraps the [`RingBuilder`] the next ring version is
//! rendered from. Only the change pipeline mutates it; every mutation that
//! succeeds marks the registry dirty so the pipeline knows a new version
//! must be rendered.

use std::sync::Arc;

use ringleader_ring::{BASE_CAPACITY, RingBuilder};
use ringleader_types::{ModifyMsg, Node, NodeId, RegisterRequest, RingVersion};

use crate::error::ClusterError;
use crate::filters::AdmissionFilters;

/// Membership table plus the filters every node must pass.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    builder: RingBuilder,
    filters: Arc<AdmissionFilters>,
    dirty: bool,
}

impl NodeRegistry {
    pub fn new(builder: RingBuilder, filters: Arc<AdmissionFilters>) -> Self {
        Self {
            builder,
            filters,
            dirty: false,
        }
    }

    pub fn builder(&self) -> &RingBuilder {
        &self.builder
    }

    pub fn filters(&self) -> &Arc<AdmissionFilters> {
        &self.filters
    }

    pub fn version(&self) -> RingVersion {
        self.builder.version()
    }

    pub(crate) fn set_version(&mut self, version: RingVersion) {
        self.builder.set_version(version);
    }

    /// Whether a mutation was applied since the last render.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.builder.node(id)
    }

    pub fn len(&self) -> usize {
        self.builder.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a node.
    ///
    /// `id == 0` allocates a fresh id; an explicit id must be unused. The
    /// node must pass the admission filters. Returns the node as stored.
    pub fn add(&mut self, mut node: Node) -> Result<Node, ClusterError> {
        if node.id != 0 && self.builder.contains(node.id) {
            return Err(ClusterError::DuplicateId(node.id));
        }
        self.filters.check(&node.addresses, &node.tiers)?;

        node.dedup_tiers();
        if node.id == 0 {
            node.id = self.builder.allocate_id();
        }
        self.builder.insert(node.clone());
        self.dirty = true;
        Ok(node)
    }

    /// Add a self-registering node: inactive, default capacity, hostname
    /// kept in `meta`, always a freshly allocated id.
    pub fn register(&mut self, req: RegisterRequest) -> Result<Node, ClusterError> {
        self.add(Node {
            id: 0,
            active: false,
            capacity: BASE_CAPACITY,
            tiers: req.tiers,
            addresses: req.addrs,
            meta: req.hostname,
            conf: Vec::new(),
        })
    }

    pub fn remove(&mut self, id: NodeId) -> Result<Node, ClusterError> {
        let node = self.builder.remove(id).ok_or(ClusterError::NotFound(id))?;
        self.dirty = true;
        Ok(node)
    }

    /// Update one attribute of a node.
    ///
    /// Recognized keys: `capacity`, `active`, `meta`, `conf`, and the
    /// comma-separated lists `tiers` and `addresses`. List updates are
    /// checked against the admission filters.
    pub fn modify(&mut self, msg: &ModifyMsg) -> Result<(), ClusterError> {
        let current = self
            .builder
            .node(msg.id)
            .ok_or(ClusterError::NotFound(msg.id))?;
        let mut node = current.clone();

        match msg.key.as_str() {
            "capacity" => {
                node.capacity = msg
                    .value
                    .trim()
                    .parse()
                    .map_err(|e| invalid(msg, format!("{e}")))?;
            }
            "active" => {
                node.active = msg
                    .value
                    .trim()
                    .parse()
                    .map_err(|e| invalid(msg, format!("{e}")))?;
            }
            "meta" => node.meta = msg.value.clone(),
            "conf" => node.conf = msg.value.as_bytes().to_vec(),
            "tiers" => {
                node.tiers = split_list(&msg.value);
                node.dedup_tiers();
                self.filters.check(&node.addresses, &node.tiers)?;
            }
            "addresses" => {
                node.addresses = split_list(&msg.value);
                if node.addresses.iter().any(|a| a.contains(char::is_whitespace)) {
                    return Err(invalid(msg, "addresses may not contain whitespace".into()));
                }
                self.filters.check(&node.addresses, &node.tiers)?;
            }
            other => return Err(ClusterError::UnknownField(other.to_string())),
        }

        self.builder.insert(node);
        self.dirty = true;
        Ok(())
    }

    /// Mark a node active. Returns whether anything changed.
    pub fn set_active(&mut self, id: NodeId) -> Result<bool, ClusterError> {
        let node = self.builder.node_mut(id).ok_or(ClusterError::NotFound(id))?;
        if node.active {
            return Ok(false);
        }
        node.active = true;
        self.dirty = true;
        Ok(true)
    }

    /// Replace the global configuration carried by the ring.
    pub fn set_conf(&mut self, conf: Vec<u8>, restart_required: bool) {
        self.builder.set_conf(conf, restart_required);
        self.dirty = true;
    }

    pub fn search(&self, query: &Node) -> Vec<Node> {
        search_nodes(self.builder.nodes(), query)
    }
}

fn invalid(msg: &ModifyMsg, reason: String) -> ClusterError {
    ClusterError::InvalidValue {
        key: msg.key.clone(),
        value: msg.value.clone(),
        reason,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Nodes matching any set field of `query`.
///
/// `id` matches exactly, each query tier matches a node tier exactly, and
/// query addresses and `meta` match as substrings. A query with no field
/// set matches nothing.
pub fn search_nodes<'a>(nodes: impl Iterator<Item = &'a Node>, query: &Node) -> Vec<Node> {
    if query.is_empty_query() {
        return Vec::new();
    }
    nodes
        .filter(|n| {
            (query.id != 0 && n.id == query.id)
                || query
                    .addresses
                    .iter()
                    .any(|q| n.addresses.iter().any(|a| a.contains(q.as_str())))
                || query.tiers.iter().any(|q| n.tiers.contains(q))
                || (!query.meta.is_empty() && n.meta.contains(query.meta.as_str()))
        })
        .cloned()
        .collect()
}
