//! File metadata — the record a downloader needs to reassemble a file.
//!
//! The JSON shape is an external contract: a metadata file written by one
//! run is read back by a separate run, possibly much later. Field names,
//! the decimal-string chunk indices, and the list-of-identifiers value all
//! stay exactly as they are.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ChunkId;

/// Produced once at the end of a successful upload; immutable afterwards.
///
/// `chunks` maps chunk index → identifier list. Indices sort numerically
/// (the map key is `u64`; serde_json renders it as the decimal string the
/// contract requires). Each list holds exactly one identifier today — the
/// list shape anticipates replication without implementing it, so readers
/// take the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub size: u64,
    pub chunks: BTreeMap<u64, Vec<ChunkId>>,
}

impl FileMetadata {
    /// Number of chunk indices recorded. A failed upload may have omitted
    /// indices, so this can be less than `ceil(size / chunk_size)`.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
