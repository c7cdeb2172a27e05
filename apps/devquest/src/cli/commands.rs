//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::CliError;
use crate::api::{self, AppState};
use crate::config::{Backend, Config};
use crate::identity::IdentityProvider;
use devquest_core::{
    DevQuestError, DocumentStore, GameService, InMemoryStore, Level, LevelId, LevelStatistics,
    RedbStore, Repository, Role,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Maximum size of a level definition file (10 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn invalid_file(path: &Path, reason: impl Into<String>) -> CliError {
    CliError::InvalidFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Resolve `path` to an existing regular file no larger than `max_size`.
fn validate_file(path: &Path, max_size: u64) -> Result<PathBuf, CliError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| invalid_file(path, e.to_string()))?;
    if !canonical.is_file() {
        return Err(invalid_file(path, "not a regular file"));
    }

    let size = std::fs::metadata(&canonical)?.len();
    if size > max_size {
        return Err(invalid_file(
            path,
            format!("{} bytes exceeds maximum {} bytes", size, max_size),
        ));
    }
    Ok(canonical)
}

/// Parse and check a JSON array of levels: ids unique and non-zero, names set.
pub fn read_levels(path: &Path) -> Result<Vec<Level>, CliError> {
    let canonical = validate_file(path, MAX_IMPORT_FILE_SIZE)?;
    let content = std::fs::read_to_string(&canonical)?;
    let levels: Vec<Level> =
        serde_json::from_str(&content).map_err(|e| invalid_file(path, e.to_string()))?;

    let mut seen = BTreeSet::new();
    for level in &levels {
        if level.level_id.value() == 0 {
            return Err(invalid_file(path, "level ids start at 1"));
        }
        if !seen.insert(level.level_id) {
            return Err(invalid_file(
                path,
                format!("duplicate level id {}", level.level_id),
            ));
        }
        if level.draft.name.trim().is_empty() {
            return Err(invalid_file(
                path,
                format!("level {} has no name", level.level_id),
            ));
        }
    }
    Ok(levels)
}

// =============================================================================
// STORE
// =============================================================================

/// Open the configured document store behind a repository.
pub fn open_repository(config: &Config) -> Result<Repository, CliError> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        Backend::Redb => Arc::new(RedbStore::open(&config.database)?),
        Backend::Memory => Arc::new(InMemoryStore::new()),
    };
    Ok(Repository::new(store, config.retry_policy()))
}

fn import_levels(repo: &Repository, levels: &[Level]) -> Result<(), CliError> {
    for level in levels {
        repo.put_level(level)?;
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    seed: Option<&Path>,
) -> Result<(), CliError> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let repo = open_repository(&config)?;
    if let Some(seed) = seed {
        let levels = read_levels(seed)?;
        import_levels(&repo, &levels)?;
        tracing::info!(count = levels.len(), "Seeded levels");
    }

    let identity = IdentityProvider::from_config(&config.identity)?;
    if matches!(identity, IdentityProvider::Local(_))
        && config.identity.local_secret == crate::config::DEVELOPMENT_SECRET
    {
        tracing::warn!(
            "Local identity provider is using the development secret. \
             Set FIREBASE_API_KEY or DEVQUEST_LOCAL_SECRET for production."
        );
    }

    println!("DevQuest Backend Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.host);
    println!("  Port:     {}", config.port);
    println!("  Backend:  {}", config.backend);
    println!("  Database: {:?}", config.database);
    println!("  Identity: {}", identity.name());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = config.bind_addr();
    let state = AppState::new(GameService::new(repo), identity, config);
    api::run_server(&addr, state).await?;
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database with every collection.
pub fn cmd_init(config: &Config, force: bool, json_mode: bool) -> Result<(), CliError> {
    if config.backend == Backend::Memory {
        println!("Memory backend selected; nothing to initialize.");
        return Ok(());
    }

    let path = &config.database;
    if path.exists() {
        if !force {
            return Err(CliError::AlreadyExists(path.clone()));
        }
        std::fs::remove_file(path)?;
    }
    RedbStore::open(path)?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": path.to_string_lossy(),
            "created": true,
        }));
    } else {
        println!("Initialized empty database at {:?}", path);
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show document counts per collection.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), CliError> {
    let repo = open_repository(config)?;
    let counts = repo.counts()?;

    if json_mode {
        let collections: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(collection, count)| (collection.name().to_string(), (*count).into()))
            .collect();
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "backend": config.backend.to_string(),
            "collections": collections,
        }));
        return Ok(());
    }

    println!("DevQuest Store Status");
    println!("=====================");
    println!("Database: {:?}", config.database);
    println!("Backend:  {}", config.backend);
    println!();
    for (collection, count) in counts {
        println!("{:<14} {}", collection.name(), count);
    }
    Ok(())
}

// =============================================================================
// LEVELS COMMAND
// =============================================================================

/// List levels in play order.
pub fn cmd_levels(config: &Config, json_mode: bool) -> Result<(), CliError> {
    let levels = open_repository(config)?.levels()?;

    if json_mode {
        print_json(&serde_json::to_value(&levels).unwrap_or_default());
        return Ok(());
    }

    if levels.is_empty() {
        println!("No levels configured. Use `devquest import -f levels.json`.");
        return Ok(());
    }
    println!("{:>4}  {:>5}  {:>9}  NAME", "ID", "ORDER", "MAX SCORE");
    for level in levels {
        println!(
            "{:>4}  {:>5}  {:>9}  {}",
            level.level_id, level.draft.order, level.draft.max_score, level.draft.name
        );
    }
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Store every level of a JSON file, replacing levels with the same id.
pub fn cmd_import(config: &Config, file: &Path, json_mode: bool) -> Result<(), CliError> {
    let levels = read_levels(file)?;
    let repo = open_repository(config)?;
    import_levels(&repo, &levels)?;

    if json_mode {
        print_json(&serde_json::json!({
            "imported": levels.len(),
            "level_ids": levels.iter().map(|l| l.level_id).collect::<Vec<LevelId>>(),
        }));
    } else {
        println!("Imported {} level(s) from {:?}", levels.len(), file);
    }
    Ok(())
}

// =============================================================================
// STATS COMMAND
// =============================================================================

/// Show the aggregated results of a level.
pub fn cmd_stats(config: &Config, level_id: LevelId, json_mode: bool) -> Result<(), CliError> {
    let repo = open_repository(config)?;
    let stats = LevelStatistics::from_records(&repo.level_progress(level_id)?);
    let whole = stats.average_stars_hundredths / 100;
    let frac = stats.average_stars_hundredths % 100;

    if json_mode {
        print_json(&serde_json::json!({
            "level_id": level_id,
            "total_attempts": stats.total_attempts,
            "completed_count": stats.completed_count,
            "average_stars": format!("{}.{:02}", whole, frac),
            "three_stars_count": stats.three_stars_count,
            "average_duration_seconds": stats.average_duration_seconds,
        }));
        return Ok(());
    }

    println!("Level {} Statistics", level_id);
    println!("===================");
    println!("Attempts:         {}", stats.total_attempts);
    println!("Completed:        {}", stats.completed_count);
    println!("Average stars:    {}.{:02}", whole, frac);
    println!("Three stars:      {}", stats.three_stars_count);
    println!("Average duration: {}s", stats.average_duration_seconds);
    Ok(())
}

// =============================================================================
// PROMOTE COMMAND
// =============================================================================

/// Give the admin role to the player registered under `email`.
pub fn cmd_promote(config: &Config, email: &str, json_mode: bool) -> Result<(), CliError> {
    let repo = open_repository(config)?;
    let email = email.trim().to_ascii_lowercase();
    let user = repo
        .user_by_email(&email)?
        .ok_or_else(|| DevQuestError::UserNotFound(email.clone()))?;
    let admin = repo.set_role(&user.uid, Role::Admin)?;
    tracing::info!(uid = %admin.uid, "Player promoted to admin");

    if json_mode {
        print_json(&serde_json::json!({
            "uid": admin.uid,
            "email": admin.email,
            "role": admin.role,
        }));
    } else {
        println!("{} ({}) is now {}", admin.email, admin.uid, admin.role.as_str());
    }
    Ok(())
}

// =============================================================================
// COMPACT COMMAND
// =============================================================================

/// Reclaim free pages of the redb file.
pub fn cmd_compact(config: &Config, json_mode: bool) -> Result<(), CliError> {
    if config.backend == Backend::Memory {
        println!("Memory backend selected; nothing to compact.");
        return Ok(());
    }

    let path = &config.database;
    let before = std::fs::metadata(path)?.len();
    {
        let mut store = RedbStore::open(path)?;
        store.compact()?;
    }
    let after = std::fs::metadata(path)?.len();

    if json_mode {
        print_json(&serde_json::json!({
            "database": path.to_string_lossy(),
            "bytes_before": before,
            "bytes_after": after,
        }));
    } else {
        println!("Compacted {:?}: {} -> {} bytes", path, before, after);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
