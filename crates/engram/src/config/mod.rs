//! Configuration for the Engram daemon
//!
//! Options load from a TOML file with serde defaults, then every option can
//! be overridden one-for-one by an `ENGRAM_*` environment variable.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::embedding::Backend;
use crate::error::{EngramError, Result};

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Memory tier sizing
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Embedding engine configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Tier sizing and retrieval defaults
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Max entries per character in the recent tier (R)
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    /// Buffer size at which auto-embed fires (B)
    #[serde(default = "default_buffer_threshold")]
    pub buffer_threshold: usize,
    /// Default k for search and context queries
    #[serde(default = "default_search_k")]
    pub default_search_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_capacity: default_recent_capacity(),
            buffer_threshold: default_buffer_threshold(),
            default_search_k: default_search_k(),
        }
    }
}

fn default_recent_capacity() -> usize {
    5
}

fn default_buffer_threshold() -> usize {
    10
}

fn default_search_k() -> usize {
    3
}

/// Embedding engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Compute backend: auto, cpu, gpu-cuda, or gpu-metal
    #[serde(default)]
    pub backend: Backend,
    /// Warm up the model at startup instead of on the first request
    #[serde(default = "default_preload")]
    pub preload: bool,
    /// Upper bound on a single model batch
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            preload: default_preload(),
            max_batch: default_max_batch(),
        }
    }
}

fn default_preload() -> bool {
    true
}

fn default_max_batch() -> usize {
    50
}

/// On-disk layout; tier paths default to subpaths of the data directory
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all persistent state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// File for the consolidated recent-tier snapshot
    #[serde(default)]
    pub recent_snapshot_path: Option<PathBuf>,
    /// Directory containing per-character buffer files
    #[serde(default)]
    pub buffer_dir: Option<PathBuf>,
    /// Directory for the vector index
    #[serde(default)]
    pub vector_store_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            recent_snapshot_path: None,
            buffer_dir: None,
            vector_store_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn recent_snapshot_path(&self) -> PathBuf {
        self.recent_snapshot_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("recent_snapshot.json"))
    }

    pub fn buffer_dir(&self) -> PathBuf {
        self.buffer_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("buffers"))
    }

    pub fn vector_store_dir(&self) -> PathBuf {
        self.vector_store_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("index"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8123")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8123".to_string()
}

impl Config {
    /// Parse a TOML config file
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EngramError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply `ENGRAM_*` environment overrides on top of the loaded values.
    ///
    /// Each recognized option maps to exactly one variable.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = read_env("ENGRAM_RECENT_CAPACITY")? {
            self.memory.recent_capacity = parse_env("ENGRAM_RECENT_CAPACITY", &v)?;
        }
        if let Some(v) = read_env("ENGRAM_BUFFER_THRESHOLD")? {
            self.memory.buffer_threshold = parse_env("ENGRAM_BUFFER_THRESHOLD", &v)?;
        }
        if let Some(v) = read_env("ENGRAM_DEFAULT_SEARCH_K")? {
            self.memory.default_search_k = parse_env("ENGRAM_DEFAULT_SEARCH_K", &v)?;
        }
        if let Some(v) = read_env("ENGRAM_EMBEDDING_BACKEND")? {
            self.embedding.backend = v.parse()?;
        }
        if let Some(v) = read_env("ENGRAM_PRELOAD_EMBEDDINGS")? {
            self.embedding.preload = parse_env("ENGRAM_PRELOAD_EMBEDDINGS", &v)?;
        }
        if let Some(v) = read_env("ENGRAM_MAX_EMBED_BATCH")? {
            self.embedding.max_batch = parse_env("ENGRAM_MAX_EMBED_BATCH", &v)?;
        }
        if let Some(v) = read_env("ENGRAM_DATA_DIR")? {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = read_env("ENGRAM_RECENT_SNAPSHOT_PATH")? {
            self.storage.recent_snapshot_path = Some(PathBuf::from(v));
        }
        if let Some(v) = read_env("ENGRAM_BUFFER_DIR")? {
            self.storage.buffer_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = read_env("ENGRAM_VECTOR_STORE_DIR")? {
            self.storage.vector_store_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = read_env("ENGRAM_LISTEN_ADDR")? {
            self.server.listen_addr = v;
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(EngramError::Config(format!("Failed to read {name}: {e}"))),
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| EngramError::Config(format!("Invalid value for {name}: {e}")))
}
