use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemoConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub memory_db: String,
    pub context_db: String,
    pub idle_connection_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub min_similarity: f32,
    pub max_context_entries: usize,
    pub context_token_budget: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub default_session: String,
    pub ephemeral_capacity: usize,
    pub entry_chunk_threshold: usize,
    pub entry_chunk_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = default_mnemo_dir()
            .join("memory")
            .to_string_lossy()
            .into_owned();
        Self {
            data_dir,
            memory_db: "memory.db".into(),
            context_db: "context.db".into(),
            idle_connection_secs: 300,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_mnemo_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 10,
            min_similarity: 0.3,
            max_context_entries: 20,
            context_token_budget: 4000,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_session: "default".into(),
            ephemeral_capacity: 100,
            entry_chunk_threshold: 1000,
            entry_chunk_size: 500,
        }
    }
}

/// Returns `~/.mnemo/`, or `./.mnemo/` when no home directory can be resolved.
pub fn default_mnemo_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemo")
}

/// Returns the default config file path: `~/.mnemo/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemo_dir().join("config.toml")
}

impl MnemoConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemoConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply MNEMO_* environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMO_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MNEMO_LOG_LEVEL") {
            self.log.level = val;
        }
        if let Ok(val) = std::env::var("MNEMO_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("MNEMO_SESSION") {
            self.memory.default_session = val;
        }
        if let Ok(val) = std::env::var("MNEMO_MEMORY_ENABLED") {
            match parse_flag(&val) {
                Some(enabled) => self.memory.enabled = enabled,
                None => tracing::warn!(value = %val, "ignoring unrecognised MNEMO_MEMORY_ENABLED"),
            }
        }
    }

    /// Path of the general-purpose store (sessions, entries, entry chunks).
    pub fn memory_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir).join(&self.storage.memory_db)
    }

    /// Path of the embedding-chunk store.
    pub fn context_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir).join(&self.storage.context_db)
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.idle_connection_secs)
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
