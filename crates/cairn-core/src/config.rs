//! Configuration system for Cairn.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CAIRN_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cairn/config.toml
//!   3. ~/.config/cairn/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    pub node: NodeConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique id within any registry this node is added to.
    pub node_id: String,
    /// Host to listen on.
    pub host: String,
    /// TCP port for the chunk protocol.
    pub port: u16,
    /// Directory chunks are persisted under, keyed by identifier.
    pub storage_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fixed chunk size in bytes. The final chunk of a file may be shorter.
    pub chunk_size: usize,
    /// Per-request deadline in seconds. The protocol has no heartbeat, so
    /// a stalled peer mid-payload is only detected by this.
    pub request_timeout_secs: u64,
    /// Upper bound on chunk requests in flight during a transfer.
    pub max_inflight: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "cairn-node".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            storage_dir: data_dir().join("storage"),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024, // 1 MiB
            request_timeout_secs: 30,
            max_inflight: 8,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("cairn")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("cairn")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CairnConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            CairnConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CAIRN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CairnConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CAIRN_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CAIRN_NODE__NODE_ID") {
            self.node.node_id = v;
        }
        if let Ok(v) = std::env::var("CAIRN_NODE__HOST") {
            self.node.host = v;
        }
        if let Ok(v) = std::env::var("CAIRN_NODE__PORT") {
            if let Ok(p) = v.parse() {
                self.node.port = p;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_NODE__STORAGE_DIR") {
            self.node.storage_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CAIRN_CLIENT__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.client.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_CLIENT__REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.client.request_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CAIRN_CLIENT__MAX_INFLIGHT") {
            if let Ok(n) = v.parse() {
                self.client.max_inflight = n;
            }
        }
    }
}
