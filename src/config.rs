use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::processing::config::ProcessingConfig;

/// Environment variable holding the settings file path.
pub const ENV_CONFIG: &str = "KBENRICH_CONFIG";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub kbenrich: KbenrichConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Core settings
#[derive(Debug, Clone, Deserialize)]
pub struct KbenrichConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Global switch: when false, documents are stored without processing.
    #[serde(default = "default_enhanced_processing")]
    pub enable_enhanced_knowledge_processing: bool,
    /// Processing YAML to use instead of the checked-in default.
    #[serde(default)]
    pub processing_config_path: Option<PathBuf>,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default)]
    pub processing_timeout_ms: Option<u64>,
}

/// Bulk synchronization settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Default source name for `kbenrich sync`
    #[serde(default)]
    pub source: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enhanced_processing() -> bool {
    true
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in KBENRICH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var(ENV_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.kbenrich.db_path.as_os_str().is_empty() {
            anyhow::bail!("kbenrich.db_path must not be empty");
        }

        let level = self.kbenrich.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            anyhow::bail!(
                "kbenrich.log_level must be one of {:?}, got '{}'",
                LOG_LEVELS,
                self.kbenrich.log_level
            );
        }

        if let Some(path) = &self.kbenrich.processing_config_path {
            if !path.is_file() {
                anyhow::bail!(
                    "processing_config_path does not exist: {}. Remove it to use the default processing config.",
                    path.display()
                );
            }
        }

        if self.kbenrich.processing_timeout_ms == Some(0) {
            anyhow::bail!("kbenrich.processing_timeout_ms must be greater than 0");
        }

        if let Some(source) = &self.sync.source {
            if source.trim().is_empty() {
                anyhow::bail!("sync.source must not be blank when set");
            }
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.kbenrich.db_path
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.kbenrich.migrations_dir
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        self.kbenrich.processing_timeout_ms.map(Duration::from_millis)
    }

    /// Load and validate the processing rules this configuration points at.
    pub fn processing_config(&self) -> Result<ProcessingConfig> {
        ProcessingConfig::load(self.kbenrich.processing_config_path.as_deref())
            .context("Failed to load processing configuration")
    }
}
