//! # DevQuest CLI Module
//!
//! Command-line interface of the DevQuest backend.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create an empty database
//! - `status` - Show document counts per collection
//! - `levels` - List the configured levels
//! - `import` - Load level definitions from a JSON file
//! - `stats` - Show the statistics of one level
//! - `promote` - Grant the admin role to a registered player
//! - `compact` - Compact the redb database file

mod commands;

use crate::config::{Config, ConfigError};
use crate::identity::IdentityError;
use clap::{Parser, Subcommand};
use devquest_core::{DevQuestError, LevelId, StoreError};
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

// =============================================================================
// ERRORS
// =============================================================================

/// Failure of a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] DevQuestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file given on the command line was rejected.
    #[error("Invalid file '{path}': {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Database {0} already exists (use --force to recreate it)")]
    AlreadyExists(PathBuf),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// DevQuest - game backend
///
/// Serves the DevQuest coding game: levels, grading of player solutions,
/// progress tracking and level unlocking.
#[derive(Parser, Debug)]
#[command(name = "devquest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database (overrides config and environment)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (persistent) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Level definitions to load before serving
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Initialize a new empty database
    Init {
        /// Recreate the database even if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show document counts per collection
    Status,

    /// List the configured levels
    Levels,

    /// Import level definitions from a JSON file
    Import {
        /// JSON array of levels
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the statistics of a level
    Stats {
        /// Level id
        level_id: u32,
    },

    /// Grant the admin role to a registered player
    Promote {
        /// Email of the player
        #[arg(short, long)]
        email: String,
    },

    /// Compact the database file
    Compact,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Layer the CLI flags over the file and environment configuration.
pub fn resolve_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(backend) = &cli.backend {
        config.backend = backend.parse()?;
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port, seed }) => {
            cmd_server(config, host, port, seed.as_deref()).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, force, json_mode),
        Some(Commands::Levels) => cmd_levels(&config, json_mode),
        Some(Commands::Import { file }) => cmd_import(&config, &file, json_mode),
        Some(Commands::Stats { level_id }) => cmd_stats(&config, LevelId(level_id), json_mode),
        Some(Commands::Promote { email }) => cmd_promote(&config, &email, json_mode),
        Some(Commands::Compact) => cmd_compact(&config, json_mode),
        // No subcommand - show status by default
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================
