//! Node-local chunk store.
//!
//! Chunks live as flat files under one directory, named by their hex
//! identifier: `<storage_dir>/<64-hex-chars>`. Files are immutable — if
//! the identifier exists, the content is correct. Concurrent writers of
//! the same identifier write identical bytes by construction, so the only
//! discipline needed is an atomic publish per file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use cairn_core::ChunkId;
use memmap2::Mmap;

/// Content-addressed chunk store.
#[derive(Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage root: {}", root.display()))?;
        Ok(Self { root })
    }

    /// Check if a chunk exists in the store.
    pub fn has(&self, id: &ChunkId) -> bool {
        self.chunk_path(id).exists()
    }

    /// Load a chunk's bytes, or None if the identifier was never stored.
    pub fn load(&self, id: &ChunkId) -> Result<Option<Bytes>> {
        let path = self.chunk_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("failed to open chunk: {}", path.display()))?;

        // Safety: file is opened read-only and we don't mutate the mmap
        let mmap = unsafe {
            Mmap::map(&file).with_context(|| format!("failed to mmap chunk: {}", path.display()))?
        };

        Ok(Some(Bytes::copy_from_slice(&mmap)))
    }

    /// Store a chunk's bytes under its identifier.
    ///
    /// Writes are atomic: temp file, then rename. Re-saving an existing
    /// identifier is a no-op — content addressing means the bytes are the
    /// same, so immutability doubles as idempotence.
    pub fn save(&self, id: &ChunkId, data: &[u8]) -> Result<()> {
        let path = self.chunk_path(id);

        if path.exists() {
            return Ok(());
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
            file.write_all(data).context("failed to write chunk data")?;
            file.sync_all().context("failed to sync chunk to disk")?;
        }

        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        tracing::trace!(id = %id, bytes = data.len(), "chunk stored");
        Ok(())
    }

    /// Filesystem path for an identifier. The identifier is the filename;
    /// strict hex parsing upstream keeps this path-traversal safe.
    fn chunk_path(&self, id: &ChunkId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    /// Count stored chunks (for stats and tests).
    pub fn count(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_none())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Total stored bytes (for stats).
    pub fn size(&self) -> u64 {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_none())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}
