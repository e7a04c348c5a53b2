//! Configuration management commands.

use anyhow::{Context, Result};
use std::path::Path;
use tessera_config::{ConfigLoader, Paths, TesseraConfig};

/// Output format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
    Toml,
}

/// Show the merged configuration.
pub fn show(project: &str, format: Format) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        Format::Toml => println!("{}", config.to_toml()?),
        Format::Text => print_text(&config),
    }
    Ok(())
}

fn print_text(config: &TesseraConfig) {
    println!("Tessera Configuration");
    println!("=====================\n");

    println!("Payloads:");
    println!("  Backend: {:?}", config.payloads.backend);
    println!("  Directory: {}", config.payloads.directory.display());
    println!("  Offload threshold: {} bytes", config.payloads.threshold_bytes);
    println!("  Sweep max age: {}s", config.payloads.sweep_max_age_secs);
    println!();

    println!("Snapshots:");
    println!("  Milestone interval: {}", config.snapshots.milestone_interval);
    println!();

    println!("Logging:");
    println!("  Filter: {}", config.logging.filter);
}

/// Validate configuration files.
pub fn validate(project: &str) -> Result<()> {
    let project_path = Path::new(project);

    if !Paths::is_initialized(project_path) {
        anyhow::bail!(
            "Project not initialized. Run 'tessera init' in {} first.",
            project_path.display()
        );
    }

    match TesseraConfig::load_from_dir(project_path) {
        Ok(_) => {
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("  {e:#}");
            Err(e)
        }
    }
}
