//! Semdex configuration system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, SemdexError};

/// Environment variable that overrides `storage.path`.
pub const DB_PATH_ENV: &str = "SEMDEX_DB_PATH";

/// Storage path that selects an in-memory engine.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemdexConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl SemdexConfig {
    /// Load config from the default path (`<data dir>/semdex/config.toml`).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SemdexError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SemdexError::Config(format!("Failed to parse config: {e}")))?;
        config.vector_index.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SemdexError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Apply `SEMDEX_DB_PATH` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                self.storage.path = path;
            }
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Semdex application-data directory.
    pub fn home_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("semdex"))
            .unwrap_or_else(|| PathBuf::from(".semdex"))
    }
}

/// Where the chunk table lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    SemdexConfig::home_dir()
        .join("semantic_search.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self { path: IN_MEMORY_PATH.into() }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    /// Storage path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).as_ref())
    }
}

/// Distance metric used for similarity search and the ANN index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    #[serde(alias = "l2", alias = "squared_l2")]
    L2sq,
    #[serde(alias = "ip", alias = "inner_product")]
    Dot,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2sq => "l2sq",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = SemdexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2sq" | "l2" | "squared_l2" => Ok(Self::L2sq),
            "dot" | "ip" | "inner_product" => Ok(Self::Dot),
            other => Err(SemdexError::Config(format!("Unknown distance metric: {other}"))),
        }
    }
}

/// Static vector index parameters, fixed when the store is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// HNSW connections per node (M).
    #[serde(default = "default_index_build_quality")]
    pub index_build_quality: usize,
    /// HNSW candidate list size during construction (ef_construction).
    #[serde(default = "default_index_build_effort")]
    pub index_build_effort: usize,
}

fn default_embedding_dim() -> usize { 384 }
fn default_index_build_quality() -> usize { 16 }
fn default_index_build_effort() -> usize { 100 }

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            metric: DistanceMetric::default(),
            index_build_quality: default_index_build_quality(),
            index_build_effort: default_index_build_effort(),
        }
    }
}

impl VectorIndexConfig {
    pub fn with_dim(embedding_dim: usize) -> Self {
        Self { embedding_dim, ..Self::default() }
    }

    /// Only the dimensionality is a hard requirement; bad build parameters
    /// degrade to an unindexed store instead.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(SemdexError::Config("embedding_dim must be positive".into()));
        }
        Ok(())
    }

    /// Reject vectors whose length differs from `embedding_dim`.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embedding_dim {
            return Err(SemdexError::Validation(format!(
                "Invalid vector dimension: expected {}, got {}",
                self.embedding_dim,
                vector.len()
            )));
        }
        Ok(())
    }
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize { 5 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { max_results: default_max_results() }
    }
}
