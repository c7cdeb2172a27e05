//! # API Request/Response Types
//!
//! JSON structures of the HTTP API. Field names follow the game client
//! (`list_commands`, `bloques_utilizados`, ...).

use devquest_core::{
    CommandResult, DevQuestError, Level, LevelId, PotionResult, ProgressRecord, Role,
    StatisticsReport, User,
    primitives::{MAX_COMMAND_LENGTH, MAX_POTION_TYPES, MAX_SUBMITTED_COMMANDS},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn required(field: &str, value: &str) -> Result<(), DevQuestError> {
    if value.trim().is_empty() {
        return Err(DevQuestError::InvalidInput(format!(
            "El campo '{}' es obligatorio",
            field
        )));
    }
    Ok(())
}

fn check_tokens(field: &str, tokens: &[String]) -> Result<(), DevQuestError> {
    if tokens.len() > MAX_SUBMITTED_COMMANDS {
        return Err(DevQuestError::InvalidInput(format!(
            "'{}' admite como máximo {} elementos",
            field, MAX_SUBMITTED_COMMANDS
        )));
    }
    if let Some(bad) = tokens
        .iter()
        .find(|t| t.trim().is_empty() || t.len() > MAX_COMMAND_LENGTH)
    {
        return Err(DevQuestError::InvalidInput(format!(
            "Elemento no válido en '{}': '{}'",
            field, bad
        )));
    }
    Ok(())
}

// =============================================================================
// GENERAL
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `GET /api` welcome document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub docs: String,
}

impl Default for RootResponse {
    fn default() -> Self {
        Self {
            message: "Bienvenido a la API de DevQuest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            docs: "/docs".to_string(),
        }
    }
}

/// A bare `{"detail": ...}` body, used for errors and simple acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), DevQuestError> {
        required("email", &self.email)?;
        required("password", &self.password)?;
        required("username", &self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), DevQuestError> {
        required("email", &self.email)?;
        required("password", &self.password)
    }
}

/// Register/login response: the bearer token plus the player's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub auth: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub levels_completed: Vec<LevelId>,
}

impl AuthResponse {
    pub fn new(token: String, user: User, levels_completed: Vec<LevelId>) -> Self {
        Self {
            auth: token,
            email: user.email,
            username: user.username,
            role: user.role,
            levels_completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub uid: String,
    pub email: String,
}

// =============================================================================
// LEVELS
// =============================================================================

/// A level as shown to a player: the stored document plus the flattened
/// command palette.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelResponse {
    #[serde(flatten)]
    pub level: Level,
    pub commands: Vec<String>,
}

impl From<Level> for LevelResponse {
    fn from(level: Level) -> Self {
        let commands = level.display_commands();
        Self { level, commands }
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Manual score report (`POST /api/progress/`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressCreate {
    pub level_id: u32,
    pub score: u32,
}

// =============================================================================
// GAME
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLevelRequest {
    pub level_id: u32,
    pub list_commands: Vec<String>,
}

impl CommandLevelRequest {
    pub fn validate(&self) -> Result<(), DevQuestError> {
        check_tokens("list_commands", &self.list_commands)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLevelResponse {
    pub correct: bool,
    pub stars: u8,
    pub message: String,
    /// Level opened by this submission, if any.
    pub unlocked: Option<LevelId>,
    pub progress: Vec<ProgressRecord>,
    pub levels_completed: Vec<LevelId>,
}

impl From<CommandResult> for CommandLevelResponse {
    fn from(result: CommandResult) -> Self {
        Self {
            correct: result.grade.correct(),
            stars: result.grade.stars.value(),
            message: result.grade.message(),
            unlocked: result.settlement.unlocked,
            progress: result.settlement.progress,
            levels_completed: result.settlement.levels_completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotionLevelRequest {
    pub level_id: u32,
    pub potions: BTreeMap<String, u32>,
    #[serde(default)]
    pub bloques_utilizados: Vec<String>,
}

impl PotionLevelRequest {
    pub fn validate(&self) -> Result<(), DevQuestError> {
        if self.potions.len() > MAX_POTION_TYPES {
            return Err(DevQuestError::InvalidInput(format!(
                "'potions' admite como máximo {} tipos",
                MAX_POTION_TYPES
            )));
        }
        check_tokens("bloques_utilizados", &self.bloques_utilizados)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotionLevelResponse {
    pub correct: bool,
    pub stars: u8,
    pub message: String,
    pub pociones_correctas: usize,
    pub total_pociones: usize,
    pub porcentaje: u8,
    pub bloques_utilizados: usize,
    /// The level's block threshold, 0 when it has none.
    pub bloques_optimales: u32,
    pub unlocked: Option<LevelId>,
    pub levels_completed: Vec<LevelId>,
}

impl From<PotionResult> for PotionLevelResponse {
    fn from(result: PotionResult) -> Self {
        let grade = result.grade;
        Self {
            correct: grade.correct(),
            stars: grade.stars.value(),
            message: grade.message(),
            pociones_correctas: grade.correct_potions,
            total_pociones: grade.total_potions,
            porcentaje: grade.percent,
            bloques_utilizados: grade.blocks_used,
            bloques_optimales: grade.optimal_blocks.unwrap_or(0),
            unlocked: result.settlement.unlocked,
            levels_completed: result.settlement.levels_completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStateRequest {
    pub level_id: u32,
    pub state: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStatisticsResponse {
    pub total_attempts: usize,
    pub completed_count: usize,
    pub average_stars: f64,
    pub three_stars_count: usize,
    pub average_duration_seconds: u64,
    pub progress: Vec<ProgressRecord>,
    pub levels_completed: Vec<LevelId>,
}

impl From<StatisticsReport> for LevelStatisticsResponse {
    // Hundredths to a two-decimal float, for display only.
    #[allow(clippy::float_arithmetic)]
    fn from(report: StatisticsReport) -> Self {
        let stats = report.statistics;
        Self {
            total_attempts: stats.total_attempts,
            completed_count: stats.completed_count,
            average_stars: f64::from(stats.average_stars_hundredths) / 100.0,
            three_stars_count: stats.three_stars_count,
            average_duration_seconds: stats.average_duration_seconds,
            progress: report.progress,
            levels_completed: report.levels_completed,
        }
    }
}
