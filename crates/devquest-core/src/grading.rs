//! # Grading
//!
//! Turns a submission into a 0-3 star rating. Both graders are pure, total
//! and deterministic: odd or empty input yields a zero-star grade, never an
//! error.
//!
//! ## Command grading
//!
//! | Received R vs expected E | Stars |
//! |--------------------------|-------|
//! | R == E                   | 3     |
//! | E ⊂ R (extras present)   | 2     |
//! | R ∩ E ≠ ∅                | 1     |
//! | otherwise, or E empty    | 0     |
//!
//! ## Potion grading
//!
//! Percentage of expected potion types brewed in the exact quantity, combined
//! with the number of blocks used against the level's `perfect_score`:
//!
//! | Percentage | Blocks vs threshold | Stars |
//! |------------|---------------------|-------|
//! | 100        | at or below         | 3     |
//! | 100        | above               | 2     |
//! | 1..=99     | any                 | 1     |
//! | 0          | any                 | 0     |

use crate::Stars;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// COMMAND GRADER
// =============================================================================

/// Result of comparing a command submission with a level's expected commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandGrade {
    pub stars: Stars,
    /// Expected tokens present in the submission.
    pub matched: usize,
    /// Expected tokens absent from the submission.
    pub missing: usize,
    /// Submitted tokens the level does not expect.
    pub extra: usize,
}

impl CommandGrade {
    #[must_use]
    pub fn correct(&self) -> bool {
        self.stars.is_passing()
    }

    /// Player-facing feedback for the grade.
    #[must_use]
    pub fn message(&self) -> String {
        match self.stars.value() {
            3 => "¡Perfecto! Solución exacta.".to_string(),
            2 => format!(
                "¡Correcto! Pero sobran {} comando(s).",
                self.extra
            ),
            1 => format!(
                "Vas por buen camino: faltan {} comando(s).",
                self.missing
            ),
            _ if self.matched == 0 && self.missing == 0 => {
                "Este nivel no tiene comandos esperados.".to_string()
            }
            _ => "Solución incorrecta, inténtalo de nuevo.".to_string(),
        }
    }
}

/// Collapse submitted tokens into a set (order and duplicates are irrelevant).
#[must_use]
pub fn dedup_commands(tokens: &[String]) -> BTreeSet<String> {
    tokens.iter().cloned().collect()
}

/// Grade a received command set against the expected one.
#[must_use]
pub fn grade_commands(expected: &BTreeSet<String>, received: &BTreeSet<String>) -> CommandGrade {
    let matched = expected.intersection(received).count();
    let missing = expected.len() - matched;
    let extra = received.len() - matched;

    let stars = if expected.is_empty() || matched == 0 {
        Stars::ZERO
    } else if missing == 0 && extra == 0 {
        Stars::PERFECT
    } else if missing == 0 {
        Stars::new(2)
    } else {
        Stars::new(1)
    };

    CommandGrade {
        stars,
        matched,
        missing,
        extra,
    }
}

// =============================================================================
// POTION GRADER
// =============================================================================

/// Result of grading a potion-level submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionGrade {
    pub stars: Stars,
    /// Expected potion types brewed in the exact quantity.
    pub correct_potions: usize,
    /// Number of expected potion types.
    pub total_potions: usize,
    /// Integer percentage of `correct_potions` over `total_potions`.
    pub percent: u8,
    pub blocks_used: usize,
    /// The level's optimal block count, if it has one.
    pub optimal_blocks: Option<u32>,
}

impl PotionGrade {
    #[must_use]
    pub fn correct(&self) -> bool {
        self.stars.is_passing()
    }

    /// Player-facing feedback for the grade.
    #[must_use]
    pub fn message(&self) -> String {
        match self.stars.value() {
            3 => "¡Perfecto! Pociones exactas con el mínimo de bloques.".to_string(),
            2 => format!(
                "¡Pociones correctas! Intenta usar {} bloque(s) o menos.",
                self.optimal_blocks.unwrap_or(0)
            ),
            1 => format!(
                "{} de {} pociones correctas.",
                self.correct_potions, self.total_potions
            ),
            _ if self.total_potions == 0 => {
                "Este nivel no tiene pociones configuradas.".to_string()
            }
            _ => "Ninguna poción es correcta, inténtalo de nuevo.".to_string(),
        }
    }
}

/// Grade brewed potion quantities and block usage.
///
/// Only potion types the level expects are counted; a level without a
/// potion configuration grades as 0% instead of dividing by zero. Without a
/// `perfect_score` threshold, block usage is not penalised.
#[must_use]
pub fn grade_potions(
    expected: &BTreeMap<String, u32>,
    actual: &BTreeMap<String, u32>,
    blocks_used: usize,
    perfect_score: Option<u32>,
) -> PotionGrade {
    let total_potions = expected.len();
    let correct_potions = expected
        .iter()
        .filter(|(kind, quantity)| actual.get(*kind) == Some(*quantity))
        .count();

    let percent = if total_potions == 0 {
        0
    } else {
        u8::try_from(correct_potions * 100 / total_potions).unwrap_or(100)
    };

    let within_blocks = perfect_score
        .is_none_or(|threshold| u64::try_from(blocks_used).unwrap_or(u64::MAX) <= u64::from(threshold));

    let stars = match percent {
        100 if within_blocks => Stars::PERFECT,
        100 => Stars::new(2),
        0 => Stars::ZERO,
        _ => Stars::new(1),
    };

    PotionGrade {
        stars,
        correct_potions,
        total_potions,
        percent,
        blocks_used,
        optimal_blocks: perfect_score,
    }
}

// =============================================================================
// TESTS
// =============================================================================
