//! cairn-core — shared types, wire grammar, and placement.
//! All other Cairn crates depend on this one.

pub mod config;
pub mod ids;
pub mod metadata;
pub mod placement;
pub mod registry;
pub mod wire;

pub use ids::ChunkId;
pub use metadata::FileMetadata;
pub use registry::{NodeAddress, NodeRegistry};
