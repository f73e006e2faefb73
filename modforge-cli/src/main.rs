//! # modforge
//!
//! Pre-flight tooling for modforge mod sets.
//!
//! The tool discovers mods (one directory per mod, each with a `mod.toml`),
//! runs the same structural checks and dependency resolution the host runs
//! at startup, and reports every problem without loading any mod code.
//!
//! ## Configuration
//!
//! Settings are read from `$XDG_CONFIG_HOME/modforge/config.toml`, which is
//! created with documented defaults on first use. See `modforge config`.
//!
//! ## Running
//!
//! ```bash
//! # Validate the configured mod directory
//! modforge validate
//!
//! # Validate a specific tree and emit JSON
//! modforge validate ./mods --format json
//!
//! # With debug logging
//! RUST_LOG=debug modforge order ./mods
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use modforge_cli::commands::{self, Status};
use modforge_cli::config::{Config, OutputFormat};
use modforge_cli::logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "modforge")]
#[command(about = "Validate mod sets and compute their load order")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (default: $XDG_CONFIG_HOME/modforge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a mod tree and report every problem
    Validate {
        /// Mod root directory (default: configured mods.directory)
        path: Option<PathBuf>,

        /// Output format (default: configured output.format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Print the load order of a mod tree
    Order {
        /// Mod root directory (default: configured mods.directory)
        path: Option<PathBuf>,
    },
    /// List the mods found in a mod tree
    List {
        /// Mod root directory (default: configured mods.directory)
        path: Option<PathBuf>,

        /// Output format (default: configured output.format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Show the effective configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, config_path, load_error) = match &cli.config {
        Some(path) => (Config::load(path)?, Some(path.clone()), None),
        None => match Config::load_default() {
            Ok(cfg) => (cfg, Config::default_config_path().ok(), None),
            Err(e) => (Config::default(), None, Some(e)),
        },
    };

    logging::init(&config.general.log_level);
    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }
    info!("modforge v{}", env!("CARGO_PKG_VERSION"));

    let mut stdout = std::io::stdout().lock();
    let status = match cli.command {
        Commands::Validate { path, format } => {
            let root = commands::mod_root(path, &config)?;
            let format = format.unwrap_or(config.output.format);
            commands::validate(&root, &config, format, &mut stdout)?
        }
        Commands::Order { path } => {
            let root = commands::mod_root(path, &config)?;
            commands::order(&root, &config, &mut stdout)?
        }
        Commands::List { path, format } => {
            let root = commands::mod_root(path, &config)?;
            let format = format.unwrap_or(config.output.format);
            commands::list(&root, &config, format, &mut stdout)?;
            Status::Valid
        }
        Commands::Config => {
            commands::show_config(&config, config_path.as_deref(), &mut stdout)?;
            Status::Valid
        }
    };

    Ok(match status {
        Status::Valid => ExitCode::SUCCESS,
        Status::Invalid => ExitCode::from(1),
    })
}
