//! Chunk placement — deterministic mapping from identifier to node.
//!
//! The identifier is read as one large base-16 integer and reduced modulo
//! the registry size; the result indexes into the lexicographically sorted
//! node ids. This is intentionally NOT a consistent-hash ring: adding or
//! removing a node changes the modulo base and re-routes most identifiers.
//! Both sides of a transfer must therefore run against the same registry
//! contents, which is exactly the contract the rest of the system assumes.

use crate::ids::ChunkId;
use crate::registry::{NodeAddress, NodeRegistry};

/// Select the node responsible for `id`, or `None` if the registry is
/// empty. Pure function of (identifier, current registry contents).
pub fn select_node<'a>(id: &ChunkId, registry: &'a NodeRegistry) -> Option<&'a NodeAddress> {
    let count = registry.len();
    if count == 0 {
        return None;
    }
    registry.nth(index_for(id, count))
}

/// `int(hex_id, 16) % count`, computed without a bignum: modular reduction
/// distributes over the base-256 digit fold.
fn index_for(id: &ChunkId, count: usize) -> usize {
    let count = count as u128;
    let idx = id
        .as_bytes()
        .iter()
        .fold(0u128, |acc, &b| (acc * 256 + b as u128) % count);
    idx as usize
}
