//! Project initialization.

use anyhow::{Context, Result};
use std::path::Path;
use tessera_config::{Paths, TesseraConfig};

/// Writes a `tessera.toml` with the development or production preset.
pub fn run(project: &str, development: bool) -> Result<()> {
    let project_path = Path::new(project);
    std::fs::create_dir_all(project_path)
        .with_context(|| format!("Failed to create {}", project_path.display()))?;

    if Paths::is_initialized(project_path) {
        anyhow::bail!(
            "{} already exists",
            Paths::project_config_file(project_path).display()
        );
    }

    let config = if development {
        TesseraConfig::development()
    } else {
        TesseraConfig::production()
    };
    let written = config.write_project_file(project_path)?;

    tracing::info!(path = %written.display(), development, "initialized project");
    println!("Created {}", written.display());
    Ok(())
}
