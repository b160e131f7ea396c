use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to engram.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub backup: BackupConfig,
}

// ── Storage ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the engine's on-disk tree
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".engram")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

// ── Similarity index / embedding ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "char-frequency" (builtin placeholder) | "openai" | "custom:<base-url>" | "none"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    /// Model name forwarded to HTTP providers
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Vector dimensionality, fixed per engine instance
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    /// API key for HTTP providers
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_embedding_provider() -> String {
    "char-frequency".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> usize {
    256
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            api_key: None,
        }
    }
}

// ── Write coordinator ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// "sync" | "async" | "batch"
    #[serde(default = "default_write_mode")]
    pub mode: String,
    /// Primary record store backend
    #[serde(default = "default_true")]
    pub store_enabled: bool,
    /// Similarity index backend
    #[serde(default = "default_true")]
    pub index_enabled: bool,
    /// Markdown mirror backend
    #[serde(default = "default_true")]
    pub mirror_enabled: bool,
}

fn default_write_mode() -> String {
    "sync".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: default_write_mode(),
            store_enabled: true,
            index_enabled: true,
            mirror_enabled: true,
        }
    }
}

// ── Backup / archive ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Archive record files older than this many days (0 disables)
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u32,
    /// Size budget for the hot tree, in bytes (0 disables cleanup)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

fn default_archive_after_days() -> u32 {
    90
}

fn default_max_size_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            archive_after_days: default_archive_after_days(),
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE),
            storage: StorageConfig::default(),
            index: IndexConfig::default(),
            coordinator: CoordinatorConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

const CONFIG_FILE: &str = "engram.toml";

impl Config {
    /// Load config from `engram.toml` in the working directory, writing a
    /// default file on first run.
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(Path::new(CONFIG_FILE))
    }

    pub fn load_or_init_at(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.to_path_buf();
            config.validate()?;
            Ok(config)
        } else {
            let config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            config.validate()?;
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, contents).context("Failed to write config file")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self.coordinator.mode.as_str() {
            "sync" | "async" | "batch" => {}
            other => anyhow::bail!("unknown coordinator mode '{other}'"),
        }
        if self.index.embedding_dimensions == 0 && self.index.embedding_provider != "none" {
            anyhow::bail!("embedding_dimensions must be non-zero");
        }
        Ok(())
    }
}
