//! Cairn integration test harness.
//!
//! Every test runs real storage nodes on ephemeral loopback ports inside
//! the test process — no root, no external setup. Each node gets its own
//! temp storage directory; tests clean up after themselves.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use cairn_core::NodeAddress;
use cairn_services::{ChunkStore, Node};
use tokio::net::TcpListener;

mod transfer;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A running node plus the handles a test needs to inspect it.
pub struct TestNode {
    pub addr: NodeAddress,
    pub store: ChunkStore,
    pub peers: cairn_services::PeerTable,
    pub dir: PathBuf,
}

/// A unique temp directory for this test run.
pub fn temp_dir(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("cairn-it-{}-{}-{}", std::process::id(), tag, n));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Start a node named `node_id` on 127.0.0.1 with an ephemeral port.
pub async fn start_node(node_id: &str) -> TestNode {
    let dir = temp_dir(node_id);
    let store = ChunkStore::new(&dir).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let node = Node::new(node_id, "127.0.0.1", port, store.clone());
    let peers = node.peers();
    tokio::spawn(node.serve(listener));

    TestNode {
        addr: NodeAddress::new(node_id, "127.0.0.1", port),
        store,
        peers,
        dir,
    }
}

/// Deterministic non-repeating-per-chunk test data.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

impl Drop for TestNode {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
