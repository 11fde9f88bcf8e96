//! Transfer orchestration — chunked upload and ordered download.
//!
//! Upload splits a file into fixed-size chunks, names each by content
//! hash, places it via the registry, and PUTs chunks with bounded
//! concurrency. A failed PUT omits that index from the metadata (the
//! caller sees which indices failed and can decide how strict to be).
//!
//! Download fetches every recorded index, verifies each chunk's bytes
//! against its identifier, and only then writes the assembled file —
//! any failure aborts the whole download with no partial output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use cairn_core::config::ClientConfig;
use cairn_core::placement::select_node;
use cairn_core::{ChunkId, FileMetadata, NodeAddress, NodeRegistry};
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;

use crate::net::{self, CallError};

/// Why a transfer failed (or, for upload, why it couldn't start).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no nodes configured")]
    NoNodes,
    #[error("chunk index {0} has an empty identifier list")]
    MissingChunk(u64),
    #[error("chunk {id} (index {index}) unavailable: {source}")]
    ChunkUnavailable {
        index: u64,
        id: ChunkId,
        source: CallError,
    },
    #[error("chunk {id} (index {index}) failed content verification")]
    Corrupt { index: u64, id: ChunkId },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("transfer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of an upload. `failed` lists chunk indices whose PUT failed and
/// which are therefore absent from `metadata.chunks`.
#[derive(Debug)]
pub struct UploadOutcome {
    pub metadata: FileMetadata,
    pub failed: Vec<u64>,
}

impl UploadOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A transfer client: an owned registry plus tuning knobs.
///
/// The registry is per-instance state. Two clients configured with
/// different node sets will place the same chunk differently — keeping the
/// registry an explicit field makes that gap visible instead of accidental.
pub struct Client {
    registry: NodeRegistry,
    chunk_size: usize,
    deadline: Duration,
    max_inflight: usize,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            registry: NodeRegistry::new(),
            // A zero chunk size would make ceiling division meaningless.
            chunk_size: config.chunk_size.max(1),
            deadline: Duration::from_secs(config.request_timeout_secs),
            max_inflight: config.max_inflight.max(1),
        }
    }

    /// Register a storage node with this client.
    pub fn add_node(&mut self, node_id: impl Into<String>, host: impl Into<String>, port: u16) {
        self.registry.add(NodeAddress::new(node_id, host, port));
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Upload a file, producing the metadata needed to download it later.
    pub async fn upload(&self, path: &Path) -> Result<UploadOutcome, TransferError> {
        if self.registry.is_empty() {
            return Err(TransferError::NoNodes);
        }

        let file_size = tokio::fs::metadata(path).await?.len();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let total_chunks = file_size.div_ceil(self.chunk_size as u64);

        tracing::info!(
            file = %path.display(),
            bytes = file_size,
            chunks = total_chunks,
            nodes = self.registry.len(),
            "upload starting"
        );

        let mut file = tokio::fs::File::open(path).await?;
        let mut tasks: JoinSet<(u64, ChunkId, Result<(), CallError>)> = JoinSet::new();
        let mut chunks: BTreeMap<u64, Vec<ChunkId>> = BTreeMap::new();
        let mut failed: Vec<u64> = Vec::new();

        let record =
            |outcome: (u64, ChunkId, Result<(), CallError>),
             chunks: &mut BTreeMap<u64, Vec<ChunkId>>,
             failed: &mut Vec<u64>| {
                let (index, id, result) = outcome;
                match result {
                    Ok(()) => {
                        chunks.entry(index).or_default().push(id);
                    }
                    Err(e) => {
                        tracing::warn!(index, id = %id, error = %e, "chunk upload failed, omitting index");
                        failed.push(index);
                    }
                }
            };

        for index in 0..total_chunks {
            // Bound the number of in-flight PUTs (and buffered chunks).
            if tasks.len() >= self.max_inflight {
                if let Some(joined) = tasks.join_next().await {
                    record(joined?, &mut chunks, &mut failed);
                }
            }

            let remaining = file_size - index * self.chunk_size as u64;
            let this_chunk = remaining.min(self.chunk_size as u64) as usize;
            let mut buf = vec![0u8; this_chunk];
            file.read_exact(&mut buf).await?;

            let id = ChunkId::of(&buf);
            let addr = match select_node(&id, &self.registry) {
                Some(addr) => addr.clone(),
                None => return Err(TransferError::NoNodes),
            };

            let deadline = self.deadline;
            tasks.spawn(async move {
                let result = net::put_chunk(&addr, &id, &buf, deadline).await;
                (index, id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            record(joined?, &mut chunks, &mut failed);
        }
        failed.sort_unstable();

        let metadata = FileMetadata {
            filename,
            size: file_size,
            chunks,
        };
        tracing::info!(
            recorded = metadata.chunk_count(),
            failed = failed.len(),
            "upload finished"
        );
        Ok(UploadOutcome { metadata, failed })
    }

    /// Download a file described by `metadata`, writing it to `dest` (a
    /// directory destination resolves to `<dest>/<metadata.filename>`).
    /// Returns the path written. No output file is created on failure.
    pub async fn download(
        &self,
        metadata: &FileMetadata,
        dest: &Path,
    ) -> Result<PathBuf, TransferError> {
        if self.registry.is_empty() {
            return Err(TransferError::NoNodes);
        }

        let out_path = if dest.is_dir() {
            dest.join(&metadata.filename)
        } else {
            dest.to_path_buf()
        };

        // Plan every fetch up front: an index with no identifiers or no
        // responsible node aborts before any byte moves. Indices come out
        // of the map numerically ascending.
        let mut plan: Vec<(u64, ChunkId, NodeAddress)> = Vec::with_capacity(metadata.chunks.len());
        for (&index, ids) in &metadata.chunks {
            let id = *ids.first().ok_or(TransferError::MissingChunk(index))?;
            let addr = select_node(&id, &self.registry)
                .ok_or(TransferError::NoNodes)?
                .clone();
            plan.push((index, id, addr));
        }

        tracing::info!(
            file = %metadata.filename,
            chunks = plan.len(),
            "download starting"
        );

        let mut tasks: JoinSet<(u64, ChunkId, Result<Bytes, CallError>)> = JoinSet::new();
        let mut fetched: BTreeMap<u64, Bytes> = BTreeMap::new();

        let settle = |outcome: (u64, ChunkId, Result<Bytes, CallError>),
                          fetched: &mut BTreeMap<u64, Bytes>|
         -> Result<(), TransferError> {
            let (index, id, result) = outcome;
            let data = result.map_err(|source| TransferError::ChunkUnavailable { index, id, source })?;
            // Content addressing makes verification free: re-hash and compare.
            if ChunkId::of(&data) != id {
                return Err(TransferError::Corrupt { index, id });
            }
            fetched.insert(index, data);
            Ok(())
        };

        let mut abort = None;
        for (index, id, addr) in plan {
            if tasks.len() >= self.max_inflight {
                if let Some(joined) = tasks.join_next().await {
                    if let Err(e) = settle(joined?, &mut fetched) {
                        abort = Some(e);
                        break;
                    }
                }
            }
            let deadline = self.deadline;
            tasks.spawn(async move {
                let result = net::get_chunk(&addr, &id, deadline).await;
                (index, id, result)
            });
        }

        if abort.is_none() {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = settle(joined?, &mut fetched) {
                    abort = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = abort {
            tasks.abort_all();
            tracing::warn!(file = %metadata.filename, error = %e, "download aborted");
            return Err(e);
        }

        // All chunks are in hand; concatenate in index order and publish
        // atomically so a crash can't leave a partial file behind.
        let mut assembled = Vec::with_capacity(metadata.size as usize);
        for data in fetched.values() {
            assembled.extend_from_slice(data);
        }
        if assembled.len() as u64 != metadata.size {
            tracing::warn!(
                expected = metadata.size,
                actual = assembled.len(),
                "assembled size differs from metadata (incomplete upload?)"
            );
        }

        let tmp_path = out_path.with_extension("cairn-partial");
        tokio::fs::write(&tmp_path, &assembled).await?;
        tokio::fs::rename(&tmp_path, &out_path).await?;

        tracing::info!(path = %out_path.display(), bytes = assembled.len(), "download finished");
        Ok(out_path)
    }
}
