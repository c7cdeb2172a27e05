//! Bounded retries around store calls.

use super::StoreError;
use crate::DevQuestError;
use crate::primitives::{DEFAULT_RETRY_BACKOFF_MS, DEFAULT_STORE_ATTEMPTS};
use std::time::Duration;

/// How often, and how patiently, a store call is retried.
///
/// Only transient failures ([`StoreError::is_transient`]) are retried, with a
/// linear backoff (`backoff * attempt`). Whatever is left after the last
/// attempt surfaces as [`DevQuestError::StoreFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_STORE_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy. Zero attempts is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no retry.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Conflicts map to [`DevQuestError::Conflict`]; every other failure to
    /// [`DevQuestError::StoreFailure`] carrying the number of attempts made.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, DevQuestError> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff.saturating_mul(attempt));
                    }
                    attempt += 1;
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    return Err(DevQuestError::Conflict(e.to_string()));
                }
                Err(source) => {
                    return Err(DevQuestError::StoreFailure {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_needs_one_attempt() {
        let mut calls = 0;
        let result = RetryPolicy::default().run(|| {
            calls += 1;
            Ok::<_, StoreError>(7)
        });
        assert_eq!(result.expect("ok"), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err(StoreError::Unavailable("busy".into()))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.expect("ok"), "done");
        assert_eq!(calls, 3);
    }

    #[test]
    fn persistent_transient_failure_surfaces_after_bound() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(StoreError::Unavailable("down".into()))
        });
        assert_eq!(calls, 4);
        match result {
            Err(DevQuestError::StoreFailure { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert!(source.is_transient());
            }
            other => unreachable!("expected StoreFailure, got {:?}", other),
        }
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), _> = policy.run(|| {
            calls += 1;
            Err(StoreError::Io("disk full".into()))
        });
        assert_eq!(calls, 1);
        assert!(matches!(
            result,
            Err(DevQuestError::StoreFailure { attempts: 1, .. })
        ));
    }

    #[test]
    fn conflicts_map_to_conflict() {
        let result: Result<(), _> = RetryPolicy::none().run(|| {
            Err(StoreError::Conflict {
                collection: "levels",
                id: "3".into(),
            })
        });
        assert!(matches!(result, Err(DevQuestError::Conflict(_))));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }
}
