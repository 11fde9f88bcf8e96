//! Node registry — the caller-local set of known storage nodes.
//!
//! Each client instance owns its own registry; a node's view of its peers
//! lives separately (populated only by JOIN). Two registries with different
//! entries compute different placements for the same chunk. That gap is a
//! property of the system, not something this type papers over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Network address of a storage node.
///
/// `node_id` is caller-assigned and must be unique within one registry;
/// nothing enforces uniqueness across the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub node_id: String,
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(node_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` form for connecting.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ordered mapping of node id → address.
///
/// Backed by a BTreeMap because the lexicographic order of node ids is
/// load-bearing: placement indexes into this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, NodeAddress>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. A duplicate id replaces the previous address.
    pub fn add(&mut self, addr: NodeAddress) {
        self.nodes.insert(addr.node_id.clone(), addr);
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeAddress> {
        self.nodes.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Addresses in lexicographic node-id order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeAddress> {
        self.nodes.values()
    }

    /// The address at position `idx` in lexicographic node-id order.
    pub fn nth(&self, idx: usize) -> Option<&NodeAddress> {
        self.nodes.values().nth(idx)
    }
}

impl FromIterator<NodeAddress> for NodeRegistry {
    fn from_iter<I: IntoIterator<Item = NodeAddress>>(iter: I) -> Self {
        let mut registry = Self::new();
        for addr in iter {
            registry.add(addr);
        }
        registry
    }
}
