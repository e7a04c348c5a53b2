//! Where configuration files live.
//!
//! Project files sit next to each other in the project directory; the user
//! file comes from the platform config directory (XDG on Linux).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

/// Shared, committed project configuration.
pub const PROJECT_CONFIG_FILE: &str = "tessera.toml";

/// Per-checkout overrides, meant to stay out of version control.
pub const LOCAL_CONFIG_FILE: &str = "tessera.local.toml";

/// Resolves configuration file locations.
pub struct Paths {
    dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            dirs: ProjectDirs::from("dev", "Tessera", "tessera"),
        }
    }

    /// `config.toml` in the user's config directory (`~/.config/tessera/` on Linux).
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        let dirs = self.dirs.as_ref().ok_or_else(|| {
            ConfigError::XdgError("no home directory to derive a user config path from".into())
        })?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }

    /// A project is initialized once its `tessera.toml` exists.
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
