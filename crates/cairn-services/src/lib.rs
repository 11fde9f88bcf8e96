//! cairn-services — the I/O half of Cairn: chunk store, storage node,
//! protocol client, and transfer orchestration.

pub mod net;
pub mod node;
pub mod peers;
pub mod store;
pub mod transfer;

pub use net::CallError;
pub use node::Node;
pub use peers::{new_peer_table, PeerTable};
pub use store::ChunkStore;
pub use transfer::{Client, TransferError, UploadOutcome};
