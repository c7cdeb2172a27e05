//! # Level Unlock Propagation
//!
//! A passing grade on level N unlocks level N+1. Failing grades unlock
//! nothing, and unlocking is idempotent: the unlocked set never holds a
//! level twice and never shrinks.

use crate::store::{Collection, DocumentStore, Modify, RetryPolicy, from_document, to_document};
use crate::{DevQuestError, LevelId, Stars, User};

/// Apply the unlock rule to an unlocked-level list.
///
/// Returns the newly unlocked level, or `None` when nothing changed.
pub fn unlock_next(unlocked: &mut Vec<LevelId>, passed: LevelId, stars: Stars) -> Option<LevelId> {
    if !stars.is_passing() {
        return None;
    }
    let next = passed.next();
    if next == passed || unlocked.contains(&next) {
        return None;
    }
    unlocked.push(next);
    Some(next)
}

/// Store-backed unlock propagation on user documents.
#[derive(Debug, Clone, Copy)]
pub struct UnlockPropagator<'a> {
    store: &'a dyn DocumentStore,
    retry: RetryPolicy,
}

impl<'a> UnlockPropagator<'a> {
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Unlock the level after `passed` for `uid` if `stars` is a pass.
    ///
    /// Returns the user as stored afterwards and the level unlocked by this
    /// call, if any. A failing grade writes nothing.
    pub fn propagate(
        &self,
        uid: &str,
        passed: LevelId,
        stars: Stars,
    ) -> Result<(User, Option<LevelId>), DevQuestError> {
        let mut unlocked = None;

        let stored = self.retry.run(|| {
            self.store.modify(Collection::Users, uid, &mut |current| {
                let Some(document) = current else {
                    return Ok(Modify::Keep);
                };
                let mut user: User = from_document(document.clone())?;
                unlocked = unlock_next(&mut user.unlocked_levels, passed, stars);
                if unlocked.is_some() {
                    Ok(Modify::Write(to_document(&user)?))
                } else {
                    Ok(Modify::Keep)
                }
            })
        })?;

        let document = stored.ok_or_else(|| DevQuestError::UserNotFound(uid.to_string()))?;
        let user = from_document(document).map_err(|source| DevQuestError::StoreFailure {
            attempts: 1,
            source,
        })?;
        Ok((user, unlocked))
    }
}

// =============================================================================
// TESTS
// =============================================================================
