//! # devquest-core
//!
//! The game engine behind DevQuest, a coding-education game where players
//! solve levels by assembling command blocks or brewing potions.
//!
//! This crate holds everything that decides an outcome:
//! - `grading`: command and potion graders (pure)
//! - `progress`: monotonic best-result upserts
//! - `unlock`: level unlock propagation
//! - `statistics`: per-level aggregates
//! - `store`: the document store contract and its backends
//! - `game`: the operations the HTTP layer exposes
//!
//! ## Constraints
//!
//! - Synchronous, no async runtime, no network dependencies
//! - No global state: the store is injected through [`Repository`]
//! - Integer arithmetic only; averages are kept in hundredths

// =============================================================================
// MODULES
// =============================================================================

pub mod game;
pub mod grading;
pub mod primitives;
pub mod progress;
pub mod repository;
pub mod statistics;
pub mod store;
pub mod types;
pub mod unlock;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CommandEntry, DevQuestError, GameSession, Level, LevelDraft, LevelId, LevelState,
    ProgressRecord, Role, Solution, Stars, User,
};

// =============================================================================
// RE-EXPORTS: Game Engine
// =============================================================================

pub use game::{
    CommandResult, GameService, PotionResult, Settlement, StatisticsReport, levels_completed,
};
pub use grading::{
    CommandGrade, PotionGrade, dedup_commands, grade_commands, grade_potions,
};
pub use progress::{Outcome, ProgressUpserter, UpsertKind, UpsertResult, merge_progress};
pub use repository::Repository;
pub use statistics::LevelStatistics;
pub use unlock::{UnlockPropagator, unlock_next};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use store::{
    Collection, Document, DocumentStore, InMemoryStore, Modify, RedbStore, RetryPolicy,
    StoreError,
};
