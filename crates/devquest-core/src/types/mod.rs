//! # Core Type Definitions
//!
//! This module contains the records the DevQuest engine works on:
//! - Identifiers and ratings (`LevelId`, `Stars`, `Role`)
//! - Level configuration (`Level`, `LevelDraft`, `CommandEntry`)
//! - Player state (`User`, `ProgressRecord`, `Solution`, `LevelState`, `GameSession`)
//! - Error types (`DevQuestError`)
//!
//! ## Wire Names
//!
//! Field names follow the documents the game client and the admin tooling
//! already exchange (`listCommands`, `potions_config`, `perfect_score`,
//! `unlocked_levels`), so records round-trip through the store unchanged.

use crate::primitives::{FIRST_LEVEL, MAX_STARS, SHELF_KEY};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS & RATINGS
// =============================================================================

/// Integer identifier of a level. Levels are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(pub u32);

impl LevelId {
    /// The level that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Get the raw id.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Star rating of a level completion, always within `0..=MAX_STARS`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    /// No stars: the attempt failed.
    pub const ZERO: Self = Self(0);
    /// The best rating.
    pub const PERFECT: Self = Self(MAX_STARS);

    /// Create a rating, clamping anything above `MAX_STARS`.
    #[must_use]
    pub const fn new(stars: u8) -> Self {
        if stars > MAX_STARS {
            Self(MAX_STARS)
        } else {
            Self(stars)
        }
    }

    /// Get the raw star count.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// A rating above zero counts as a pass.
    #[must_use]
    pub const fn is_passing(self) -> bool {
        self.0 > 0
    }

    /// Whether this is the best possible rating.
    #[must_use]
    pub const fn is_perfect(self) -> bool {
        self.0 == MAX_STARS
    }
}

impl From<u8> for Stars {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Stars> for u8 {
    fn from(value: Stars) -> Self {
        value.0
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

// =============================================================================
// LEVEL
// =============================================================================

/// One entry of a level's `listCommands` mapping.
///
/// A category maps either to a single command token or to a set of named
/// slots, each holding one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandEntry {
    Single(String),
    Slots(BTreeMap<String, String>),
}

/// Fields shared by a stored level and a level being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LevelDraft {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub difficulty: u32,
    pub max_score: u32,
    pub order: u32,
    pub estimated_time: u32,
    #[serde(rename = "listCommands", default)]
    pub list_commands: BTreeMap<String, CommandEntry>,
    #[serde(default)]
    pub potions_config: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perfect_score: Option<u32>,
}

impl LevelDraft {
    /// Assign an id, producing a storable level.
    #[must_use]
    pub fn into_level(self, level_id: LevelId) -> Level {
        Level {
            level_id,
            draft: self,
        }
    }
}

/// A game level as stored in the `levels` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub level_id: LevelId,
    #[serde(flatten)]
    pub draft: LevelDraft,
}

impl Level {
    /// The command tokens a solution must contain.
    ///
    /// Slot values are flattened; top-level scalars are included except the
    /// shelf placeholder.
    #[must_use]
    pub fn expected_commands(&self) -> BTreeSet<String> {
        let mut expected = BTreeSet::new();
        for (category, entry) in &self.draft.list_commands {
            match entry {
                CommandEntry::Slots(slots) => expected.extend(slots.values().cloned()),
                CommandEntry::Single(command) if category != SHELF_KEY => {
                    expected.insert(command.clone());
                }
                CommandEntry::Single(_) => {}
            }
        }
        expected
    }

    /// Every command token configured for the level, shelf included.
    ///
    /// This is the palette shown to the player, in category order.
    #[must_use]
    pub fn display_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        for entry in self.draft.list_commands.values() {
            match entry {
                CommandEntry::Single(command) => commands.push(command.clone()),
                CommandEntry::Slots(slots) => commands.extend(slots.values().cloned()),
            }
        }
        commands
    }

    /// Points awarded for a given star rating, proportional to `max_score`.
    #[must_use]
    pub fn score_for(&self, stars: Stars) -> u32 {
        let points = u64::from(self.draft.max_score) * u64::from(stars.value())
            / u64::from(MAX_STARS);
        u32::try_from(points).unwrap_or(u32::MAX)
    }

    /// Star rating implied by a raw score. A zero `max_score` yields zero stars.
    #[must_use]
    pub fn stars_for(&self, score: u32) -> Stars {
        if self.draft.max_score == 0 {
            return Stars::ZERO;
        }
        let stars = u64::from(score) * u64::from(MAX_STARS) / u64::from(self.draft.max_score);
        Stars::new(u8::try_from(stars).unwrap_or(MAX_STARS))
    }
}

// =============================================================================
// USER
// =============================================================================

fn default_unlocked() -> Vec<LevelId> {
    vec![LevelId(FIRST_LEVEL)]
}

/// A player account as stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_unlocked")]
    pub unlocked_levels: Vec<LevelId>,
    pub registration_date: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub premium: bool,
}

impl User {
    /// Create a regular account with only the first level unlocked.
    #[must_use]
    pub fn new(
        uid: impl Into<String>,
        email: impl Into<String>,
        username: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            username: username.into(),
            role: Role::User,
            unlocked_levels: default_unlocked(),
            registration_date: now,
            last_login: Some(now),
            premium: false,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the player may attempt `level`. Admins may attempt anything.
    #[must_use]
    pub fn can_play(&self, level: LevelId) -> bool {
        self.is_admin() || self.unlocked_levels.contains(&level)
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// What the player submitted for their best result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Solution {
    Commands {
        commands: Vec<String>,
    },
    Potions {
        potions: BTreeMap<String, u32>,
        blocks: Vec<String>,
    },
}

/// A player's best result on one level, stored in the `progress` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub progress_id: String,
    pub user_id: String,
    pub level_id: LevelId,
    #[serde(default)]
    pub stars: Stars,
    #[serde(default)]
    pub score: u32,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

impl ProgressRecord {
    /// Document id of the record for a (user, level) pair.
    ///
    /// One id per pair makes the "one best record" invariant structural.
    #[must_use]
    pub fn key(uid: &str, level: LevelId) -> String {
        format!("{}_{}", uid, level)
    }

    /// Seconds between start and completion, if both are known and ordered.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<u64> {
        let completed = self.completion_date?;
        u64::try_from((completed - self.start_date).num_seconds()).ok()
    }
}

// =============================================================================
// LEVEL STATE & GAME SESSION
// =============================================================================

/// A saved, resumable snapshot of a level in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelState {
    pub uid: String,
    pub level_id: LevelId,
    pub state: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl LevelState {
    /// Document id of the saved state for a (user, level) pair.
    #[must_use]
    pub fn key(uid: &str, level: LevelId) -> String {
        format!("{}_{}", uid, level)
    }
}

/// Last recorded session event for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub uid: String,
    pub exit: bool,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in DevQuest operations.
#[derive(Debug, Error)]
pub enum DevQuestError {
    /// The referenced level does not exist.
    #[error("Level not found: {0}")]
    LevelNotFound(LevelId),

    /// The referenced user has no account document.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The level exists but is not unlocked for this user yet.
    #[error("Level {level} is locked for user {uid}")]
    LevelLocked { uid: String, level: LevelId },

    /// The caller lacks the role required for the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request payload is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A conditional write lost against a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The document store kept failing after all retries.
    #[error("Store failure after {attempts} attempt(s): {source}")]
    StoreFailure {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

// =============================================================================
// TESTS
// =============================================================================
