//! # Progress Upserter
//!
//! Records a player's best result per level without ever regressing.
//!
//! - No record yet: create one, `start_date = completion_date = now`.
//! - Record exists and the new result is at least as good: update in place,
//!   keep `start_date`, refresh `completion_date`.
//! - Record exists and the new result is worse: leave it untouched.
//!
//! Results compare as `(stars, score)` tuples. The comparison and the write
//! happen inside one [`DocumentStore::modify`] call keyed by
//! `"{uid}_{level_id}"`, so two concurrent submissions for the same pair
//! cannot overwrite a better result with a worse one.

use crate::store::{Collection, DocumentStore, Modify, RetryPolicy, from_document, to_document};
use crate::{DevQuestError, LevelId, ProgressRecord, Solution, Stars};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A new result to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub stars: Stars,
    pub score: u32,
    pub solution: Option<Solution>,
}

impl Outcome {
    fn rank(&self) -> (Stars, u32) {
        (self.stars, self.score)
    }
}

/// What the upsert did with the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    /// First result for the pair.
    Created,
    /// The new result was at least as good and replaced the old one.
    Improved,
    /// The new result was worse; the stored record is unchanged.
    Kept,
}

/// The stored record after an upsert, and how it got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    pub record: ProgressRecord,
    pub kind: UpsertKind,
}

/// Decide the stored record given the existing one and a new outcome.
///
/// Pure: the store-backed [`ProgressUpserter`] runs this inside its atomic update.
#[must_use]
pub fn merge_progress(
    existing: Option<ProgressRecord>,
    uid: &str,
    level: LevelId,
    outcome: Outcome,
    now: DateTime<Utc>,
) -> UpsertResult {
    match existing {
        None => UpsertResult {
            record: ProgressRecord {
                progress_id: ProgressRecord::key(uid, level),
                user_id: uid.to_string(),
                level_id: level,
                stars: outcome.stars,
                score: outcome.score,
                start_date: now,
                completion_date: Some(now),
                solution: outcome.solution,
            },
            kind: UpsertKind::Created,
        },
        Some(stored) if outcome.rank() >= (stored.stars, stored.score) => UpsertResult {
            record: ProgressRecord {
                stars: outcome.stars,
                score: outcome.score,
                completion_date: Some(now),
                solution: outcome.solution.or(stored.solution.clone()),
                ..stored
            },
            kind: UpsertKind::Improved,
        },
        Some(stored) => UpsertResult {
            record: stored,
            kind: UpsertKind::Kept,
        },
    }
}

/// Store-backed progress upserts.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpserter<'a> {
    store: &'a dyn DocumentStore,
    retry: RetryPolicy,
}

impl<'a> ProgressUpserter<'a> {
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Record `outcome` for `(uid, level)`, keeping the best result.
    pub fn record(
        &self,
        uid: &str,
        level: LevelId,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<UpsertResult, DevQuestError> {
        let key = ProgressRecord::key(uid, level);
        let mut kind = UpsertKind::Kept;

        let stored = self.retry.run(|| {
            self.store.modify(Collection::Progress, &key, &mut |current| {
                let existing = current
                    .cloned()
                    .map(from_document::<ProgressRecord>)
                    .transpose()?;
                let result = merge_progress(existing, uid, level, outcome.clone(), now);
                kind = result.kind;
                match result.kind {
                    UpsertKind::Kept => Ok(Modify::Keep),
                    UpsertKind::Created | UpsertKind::Improved => {
                        Ok(Modify::Write(to_document(&result.record)?))
                    }
                }
            })
        })?;

        let document = stored.ok_or_else(|| {
            DevQuestError::Conflict(format!("progress {} vanished during upsert", key))
        })?;
        let record = from_document(document).map_err(|source| DevQuestError::StoreFailure {
            attempts: 1,
            source,
        })?;
        Ok(UpsertResult { record, kind })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .expect("date")
            .with_timezone(&Utc)
    }

    fn outcome(stars: u8, score: u32) -> Outcome {
        Outcome {
            stars: Stars::new(stars),
            score,
            solution: None,
        }
    }

    #[test]
    fn first_result_creates_record() {
        let result = merge_progress(None, "u1", LevelId(1), outcome(2, 200), t0());
        assert_eq!(result.kind, UpsertKind::Created);
        assert_eq!(result.record.progress_id, "u1_1");
        assert_eq!(result.record.start_date, t0());
        assert_eq!(result.record.completion_date, Some(t0()));
    }

    #[test]
    fn better_result_updates_and_keeps_start() {
        let first = merge_progress(None, "u1", LevelId(1), outcome(1, 100), t0()).record;
        let later = t0() + Duration::minutes(5);
        let result = merge_progress(Some(first), "u1", LevelId(1), outcome(3, 300), later);
        assert_eq!(result.kind, UpsertKind::Improved);
        assert_eq!(result.record.stars, Stars::PERFECT);
        assert_eq!(result.record.start_date, t0());
        assert_eq!(result.record.completion_date, Some(later));
    }

    #[test]
    fn equal_result_refreshes_completion() {
        let first = merge_progress(None, "u1", LevelId(1), outcome(2, 200), t0()).record;
        let later = t0() + Duration::minutes(1);
        let result = merge_progress(Some(first), "u1", LevelId(1), outcome(2, 200), later);
        assert_eq!(result.kind, UpsertKind::Improved);
        assert_eq!(result.record.completion_date, Some(later));
    }

    #[test]
    fn worse_result_is_refused() {
        let first = merge_progress(None, "u1", LevelId(1), outcome(2, 200), t0()).record;
        let later = t0() + Duration::minutes(1);
        let result = merge_progress(Some(first.clone()), "u1", LevelId(1), outcome(1, 100), later);
        assert_eq!(result.kind, UpsertKind::Kept);
        assert_eq!(result.record, first);
    }

    #[test]
    fn improvement_without_solution_keeps_previous_solution() {
        let with_solution = Outcome {
            stars: Stars::new(1),
            score: 10,
            solution: Some(Solution::Commands {
                commands: vec!["IF".to_string()],
            }),
        };
        let first = merge_progress(None, "u1", LevelId(1), with_solution, t0()).record;
        let result = merge_progress(Some(first), "u1", LevelId(1), outcome(2, 20), t0());
        assert!(result.record.solution.is_some());
    }

    #[test]
    fn stored_stars_never_regress() {
        let store = InMemoryStore::new();
        let upserter = ProgressUpserter::new(&store, RetryPolicy::none());

        let first = upserter
            .record("u1", LevelId(4), &outcome(2, 200), t0())
            .expect("first");
        assert_eq!(first.kind, UpsertKind::Created);

        let second = upserter
            .record("u1", LevelId(4), &outcome(1, 100), t0() + Duration::minutes(2))
            .expect("second");
        assert_eq!(second.kind, UpsertKind::Kept);
        assert_eq!(second.record.stars, Stars::new(2));

        let doc = store
            .get(Collection::Progress, "u1_4")
            .expect("get")
            .expect("present");
        let stored: ProgressRecord = from_document(doc).expect("decode");
        assert_eq!(stored.stars, Stars::new(2));
        assert_eq!(store.count(Collection::Progress).expect("count"), 1);
    }

    #[test]
    fn corrupt_stored_record_is_reported() {
        let store = InMemoryStore::new();
        let mut bad = crate::store::Document::new();
        bad.insert("stars".to_string(), serde_json::json!("many"));
        store.set(Collection::Progress, "u1_1", &bad).expect("set");

        let upserter = ProgressUpserter::new(&store, RetryPolicy::none());
        let result = upserter.record("u1", LevelId(1), &outcome(3, 300), t0());
        assert!(matches!(result, Err(DevQuestError::StoreFailure { .. })));
    }
}
