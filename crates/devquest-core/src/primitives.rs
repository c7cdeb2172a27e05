//! # Game Primitives
//!
//! Hardcoded constants shared by the grading, progress and storage layers.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Highest star rating a level completion can earn.
pub const MAX_STARS: u8 = 3;

/// The level every new account starts with unlocked.
pub const FIRST_LEVEL: u32 = 1;

/// Top-level `listCommands` key holding the shelf placeholder.
///
/// A scalar under this key describes the scene, not a command the player
/// must submit, so it is left out of the expected token set.
pub const SHELF_KEY: &str = "ESTANTE";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of command tokens in a single submission.
pub const MAX_SUBMITTED_COMMANDS: usize = 256;

/// Maximum length in bytes of a single command token.
pub const MAX_COMMAND_LENGTH: usize = 64;

/// Maximum number of potion types in a single submission.
pub const MAX_POTION_TYPES: usize = 64;

// =============================================================================
// STORE RETRY DEFAULTS
// =============================================================================

/// Default number of attempts for a store call (first try included).
pub const DEFAULT_STORE_ATTEMPTS: u32 = 3;

/// Default backoff between attempts, multiplied by the attempt number.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_level_is_one() {
        assert_eq!(FIRST_LEVEL, 1);
    }

    #[test]
    fn retries_are_bounded() {
        assert!(DEFAULT_STORE_ATTEMPTS >= 1);
        assert!(DEFAULT_STORE_ATTEMPTS <= 10);
    }
}
