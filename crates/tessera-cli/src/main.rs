//! Tessera operator CLI.
//!
//! Configuration inspection and payload-store maintenance.
//!
//! # Quick Start
//!
//! ```bash
//! # Create tessera.toml in the current directory
//! tessera init --development
//!
//! # Show the merged configuration
//! tessera config show --format toml
//!
//! # Store, inspect and reclaim offloaded payloads
//! tessera payload put ./large.json
//! tessera payload stat
//! tessera payload sweep --max-age-secs 3600           # dry run
//! tessera payload sweep --max-age-secs 3600 --force   # delete
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tessera_config::ConfigLoader;
use tracing_subscriber::EnvFilter;

use commands::config::Format;
use commands::payload::Target;

/// Tessera - event-sourcing core with editions, snapshots and content-addressed payloads.
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding tessera.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Write a tessera.toml into the project directory.
    Init {
        /// Use the development preset (memory backend, low threshold).
        #[arg(long)]
        development: bool,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Payload store maintenance.
    #[command(subcommand)]
    Payload(PayloadCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Validate the configuration files.
    Validate,
}

#[derive(Subcommand)]
enum PayloadCommands {
    /// Store a file (or `-` for stdin) and print its reference.
    Put {
        file: String,

        /// Blob directory (defaults to payloads.directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Write the verified bytes of a blob.
    Get {
        /// Hex SHA-256 of the blob.
        hash: String,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Blob directory (defaults to payloads.directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show blob count and total size.
    Stat {
        /// Blob directory (defaults to payloads.directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// List blobs untouched for longer than the max age; delete with --force.
    Sweep {
        /// Age threshold in seconds (defaults to payloads.sweep_max_age_secs).
        #[arg(long)]
        max_age_secs: Option<u64>,

        /// Hashes that are still referenced and must be kept.
        #[arg(long)]
        keep: Vec<String>,

        /// Delete the listed blobs. Only safe when every referenced hash is in --keep.
        #[arg(long)]
        force: bool,

        /// Blob directory (defaults to payloads.directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Re-hash every blob and report corruption.
    Verify {
        /// Blob directory (defaults to payloads.directory).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn init_logging(project: &str) {
    // RUST_LOG wins; otherwise logging.filter from the project config.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = ConfigLoader::new()
            .with_project_dir(project)
            .load_or_default()
            .logging
            .filter;
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.project);

    let project = cli.project.as_str();
    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Init { development } => commands::init::run(project, development),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(project, format),
            ConfigCommands::Validate => commands::config::validate(project),
        },
        Commands::Payload(cmd) => match cmd {
            PayloadCommands::Put { file, dir } => commands::payload::put(
                &Target {
                    project,
                    dir: dir.as_deref(),
                },
                &file,
            ),
            PayloadCommands::Get { hash, out, dir } => commands::payload::get(
                &Target {
                    project,
                    dir: dir.as_deref(),
                },
                &hash,
                out.as_deref(),
            ),
            PayloadCommands::Stat { dir } => commands::payload::stat(&Target {
                project,
                dir: dir.as_deref(),
            }),
            PayloadCommands::Sweep {
                max_age_secs,
                keep,
                force,
                dir,
            } => commands::payload::sweep(
                &Target {
                    project,
                    dir: dir.as_deref(),
                },
                max_age_secs,
                &keep,
                force,
            ),
            PayloadCommands::Verify { dir } => commands::payload::verify(&Target {
                project,
                dir: dir.as_deref(),
            }),
        },
    }
}
