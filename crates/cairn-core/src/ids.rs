//! Content addressing — a chunk is named by the SHA-256 of its bytes.
//!
//! The identifier doubles as the on-disk storage key and the placement key,
//! so the hex rendering is strict: exactly 64 lowercase hex characters,
//! nothing else parses. Identical bytes always produce the identical id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a chunk identifier in its canonical hex form.
pub const CHUNK_ID_HEX_LEN: usize = 64;

/// SHA-256 digest of a chunk's bytes.
///
/// Immutable once computed — never recomputed after creation. Rendered as
/// lowercase hex everywhere: on the wire, in metadata, and as the store
/// filename.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; 32]);

impl ChunkId {
    /// Compute the identifier for a byte sequence. Total — the empty
    /// sequence hashes like any other.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical 64-character lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the canonical rendering. Rejects uppercase and anything that
    /// is not exactly 64 hex characters — identifiers are used as
    /// filenames, so nothing looser is accepted off the wire.
    pub fn from_hex(s: &str) -> Result<Self, ChunkIdError> {
        if s.len() != CHUNK_ID_HEX_LEN {
            return Err(ChunkIdError::BadLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(ChunkIdError::BadEncoding);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ChunkIdError::BadEncoding)?;
        Ok(Self(bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkIdError {
    #[error("chunk id must be {CHUNK_ID_HEX_LEN} hex characters, got {0}")]
    BadLength(usize),
    #[error("chunk id must be lowercase hex")]
    BadEncoding,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

impl FromStr for ChunkId {
    type Err = ChunkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Metadata stores identifiers as hex strings — that JSON shape is an
// external contract, so serde goes through the canonical rendering.

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChunkId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
