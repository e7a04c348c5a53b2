//! Configuration management for Tessera
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (TESSERA_* prefix, highest precedence)
//! 2. tessera.local.toml (gitignored, local overrides)
//! 3. tessera.toml (git-tracked, project config)
//! 4. ~/.config/tessera/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Default payload offload threshold (256 KiB).
pub const DEFAULT_THRESHOLD_BYTES: usize = 256 * 1024;

/// Default age after which unreferenced blobs are swept (7 days).
pub const DEFAULT_SWEEP_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Main Tessera configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub payloads: PayloadConfig,
    pub snapshots: SnapshotConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Payloads strictly larger than this are offloaded.
    pub threshold_bytes: usize,
    pub backend: PayloadBackend,
    /// Blob directory for the filesystem backend.
    pub directory: PathBuf,
    pub sweep_max_age_secs: u64,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            backend: PayloadBackend::Memory,
            directory: PathBuf::from(".tessera/payloads"),
            sweep_max_age_secs: DEFAULT_SWEEP_MAX_AGE_SECS,
        }
    }
}

impl PayloadConfig {
    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadBackend {
    Memory,
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Every N-th default snapshot is also kept as a milestone; 0 disables.
    pub milestone_interval: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            milestone_interval: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl TesseraConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Create a development configuration
    pub fn development() -> Self {
        Self {
            payloads: PayloadConfig {
                threshold_bytes: 4 * 1024,
                backend: PayloadBackend::Memory,
                ..Default::default()
            },
            logging: LoggingConfig {
                filter: "debug".to_string(),
            },
            ..Default::default()
        }
    }

    /// Create a production configuration
    pub fn production() -> Self {
        Self {
            payloads: PayloadConfig {
                backend: PayloadBackend::Filesystem,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.payloads.directory.is_relative() {
            self.payloads.directory = base.join(&self.payloads.directory);
        }
    }

    /// Rejects values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payloads.threshold_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "payloads.threshold_bytes must be greater than zero".to_string(),
            ));
        }
        if self.payloads.backend == PayloadBackend::Filesystem
            && self.payloads.directory.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "payloads.directory is required for the filesystem backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes `tessera.toml` into `project_dir`, refusing to overwrite.
    pub fn write_project_file(&self, project_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = Paths::project_config_file(project_dir);
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        let rendered = self.to_toml()?;
        std::fs::write(&path, rendered).map_err(|source| ConfigError::WriteError {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
