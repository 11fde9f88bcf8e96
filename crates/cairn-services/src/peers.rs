//! Peer table — nodes that have announced themselves via JOIN.
//!
//! Populated only by JOIN messages this node receives; it has no effect on
//! placement. Clients keep their own registry from explicit configuration.

use std::sync::Arc;
use std::time::Instant;

use cairn_core::NodeAddress;
use dashmap::DashMap;

/// What a JOIN told us about a peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// Self-announced address. Nothing verifies it is reachable.
    pub addr: NodeAddress,
    /// When the most recent JOIN for this peer arrived.
    pub last_seen: Instant,
}

impl PeerEntry {
    pub fn announced(addr: NodeAddress) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
        }
    }
}

/// The peer table — shared between connection tasks. Keyed on node id;
/// a repeated JOIN replaces the previous address.
pub type PeerTable = Arc<DashMap<String, PeerEntry>>;

/// Create a new empty peer table.
pub fn new_peer_table() -> PeerTable {
    Arc::new(DashMap::new())
}
