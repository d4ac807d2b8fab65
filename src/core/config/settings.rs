use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::defaults;
use crate::core::errors::KnowledgeError;

/// Which document backend the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared with the previous window
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            chunk_overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Rebuild the in-memory index from durable chunks during startup
    pub reload_on_start: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            reload_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Windows embedded at once; results are still assigned in partition order
    pub concurrency: usize,
    pub cache: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: defaults::EMBEDDING_BASE_URL.to_string(),
            model: defaults::EMBEDDING_MODEL.to_string(),
            api_key: None,
            timeout_secs: defaults::EMBEDDING_TIMEOUT_SECS,
            concurrency: defaults::EMBEDDING_CONCURRENCY,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_top_k: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_top_k: defaults::SEARCH_TOP_K,
        }
    }
}

/// Typed view over the merged `config.yml` + `secrets.yaml` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSettings {
    pub chunking: ChunkingSettings,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
}

impl KnowledgeSettings {
    /// Extracts the engine sections, ignoring unrelated top-level keys.
    pub fn from_value(config: &Value) -> Result<Self, KnowledgeError> {
        serde_json::from_value(config.clone())
            .map_err(|e| KnowledgeError::InvalidConfig(e.to_string()))
    }
}
