//! # Game Service
//!
//! One method per player-facing operation. A graded submission runs:
//!
//! 1. Load the level (`LevelNotFound`) and the user (`UserNotFound`).
//! 2. Refuse levels the user has not unlocked, unless the user is an admin.
//! 3. Grade, upsert progress, propagate the unlock.
//! 4. Return the user's full progress and completed-level ids.
//!
//! The service never reads the clock; callers pass `now`.

use crate::grading::{
    CommandGrade, PotionGrade, dedup_commands, grade_commands, grade_potions,
};
use crate::progress::{Outcome, ProgressUpserter, UpsertResult};
use crate::repository::Repository;
use crate::statistics::LevelStatistics;
use crate::unlock::UnlockPropagator;
use crate::{
    DevQuestError, GameSession, Level, LevelDraft, LevelId, LevelState, ProgressRecord, Solution,
    User,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Ids of the levels a player has passed, sorted and distinct.
#[must_use]
pub fn levels_completed(records: &[ProgressRecord]) -> Vec<LevelId> {
    records
        .iter()
        .filter(|r| r.stars.is_passing())
        .map(|r| r.level_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// What recording a graded result did, plus the player's state afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub upsert: UpsertResult,
    /// Level unlocked by this submission, if any.
    pub unlocked: Option<LevelId>,
    pub progress: Vec<ProgressRecord>,
    pub levels_completed: Vec<LevelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub grade: CommandGrade,
    pub settlement: Settlement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PotionResult {
    pub grade: PotionGrade,
    pub settlement: Settlement,
}

/// Level statistics together with the requesting player's own progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsReport {
    pub statistics: LevelStatistics,
    pub progress: Vec<ProgressRecord>,
    pub levels_completed: Vec<LevelId>,
}

/// The DevQuest game operations over a [`Repository`].
#[derive(Debug, Clone)]
pub struct GameService {
    repo: Repository,
}

impl GameService {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    /// Create the user document for a freshly registered identity.
    ///
    /// Fails with `Conflict` when the uid already has a document; the stored
    /// profile and its unlocked levels stay as they are.
    pub fn register_user(
        &self,
        uid: &str,
        email: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<User, DevQuestError> {
        let user = User::new(uid, email, username, now);
        self.repo.insert_user(&user)?;
        Ok(user)
    }

    /// Whether a user document already carries this email.
    pub fn email_registered(&self, email: &str) -> Result<bool, DevQuestError> {
        Ok(self.repo.user_by_email(email)?.is_some())
    }

    /// Stamp the login time and return the user with their completed levels.
    pub fn login(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, Vec<LevelId>), DevQuestError> {
        let user = self.repo.touch_last_login(uid, now)?;
        let completed = levels_completed(&self.repo.user_progress(uid)?);
        Ok((user, completed))
    }

    // =========================================================================
    // LEVELS
    // =========================================================================

    pub fn list_levels(&self) -> Result<Vec<Level>, DevQuestError> {
        self.repo.levels()
    }

    pub fn get_level(&self, level_id: LevelId) -> Result<Level, DevQuestError> {
        self.repo
            .level(level_id)?
            .ok_or(DevQuestError::LevelNotFound(level_id))
    }

    /// Create a level. Only admins may do this.
    pub fn create_level(&self, requester: &str, draft: LevelDraft) -> Result<Level, DevQuestError> {
        let user = self.user(requester)?;
        if !user.is_admin() {
            return Err(DevQuestError::Forbidden(
                "No tiene permisos para crear niveles".to_string(),
            ));
        }
        if draft.name.trim().is_empty() {
            return Err(DevQuestError::InvalidInput(
                "El nivel necesita un nombre".to_string(),
            ));
        }
        self.repo.create_level(draft)
    }

    // =========================================================================
    // SUBMISSIONS
    // =========================================================================

    /// Grade a command submission and record the result.
    pub fn validate_commands(
        &self,
        uid: &str,
        level_id: LevelId,
        commands: &[String],
        now: DateTime<Utc>,
    ) -> Result<CommandResult, DevQuestError> {
        let level = self.playable(uid, level_id)?;
        let grade = grade_commands(&level.expected_commands(), &dedup_commands(commands));
        let outcome = Outcome {
            stars: grade.stars,
            score: level.score_for(grade.stars),
            solution: Some(Solution::Commands {
                commands: commands.to_vec(),
            }),
        };
        let settlement = self.settle(uid, level_id, &outcome, now)?;
        Ok(CommandResult { grade, settlement })
    }

    /// Grade a potion-level submission and record the result.
    pub fn validate_potions(
        &self,
        uid: &str,
        level_id: LevelId,
        potions: &BTreeMap<String, u32>,
        blocks: &[String],
        now: DateTime<Utc>,
    ) -> Result<PotionResult, DevQuestError> {
        let level = self.playable(uid, level_id)?;
        let grade = grade_potions(
            &level.draft.potions_config,
            potions,
            blocks.len(),
            level.draft.perfect_score,
        );
        let outcome = Outcome {
            stars: grade.stars,
            score: level.score_for(grade.stars),
            solution: Some(Solution::Potions {
                potions: potions.clone(),
                blocks: blocks.to_vec(),
            }),
        };
        let settlement = self.settle(uid, level_id, &outcome, now)?;
        Ok(PotionResult { grade, settlement })
    }

    /// Record a raw score reported by the client; stars derive from `max_score`.
    pub fn record_score(
        &self,
        uid: &str,
        level_id: LevelId,
        score: u32,
        now: DateTime<Utc>,
    ) -> Result<Settlement, DevQuestError> {
        let level = self.playable(uid, level_id)?;
        let outcome = Outcome {
            stars: level.stars_for(score),
            score,
            solution: None,
        };
        self.settle(uid, level_id, &outcome, now)
    }

    // =========================================================================
    // PROGRESS & STATISTICS
    // =========================================================================

    pub fn progress(&self, uid: &str) -> Result<Vec<ProgressRecord>, DevQuestError> {
        self.repo.user_progress(uid)
    }

    /// Aggregate statistics of a level. A level without records reports zeroes.
    pub fn level_statistics(
        &self,
        uid: &str,
        level_id: LevelId,
    ) -> Result<StatisticsReport, DevQuestError> {
        let statistics = LevelStatistics::from_records(&self.repo.level_progress(level_id)?);
        let progress = self.repo.user_progress(uid)?;
        let completed = levels_completed(&progress);
        Ok(StatisticsReport {
            statistics,
            progress,
            levels_completed: completed,
        })
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Overwrite the saved state of a level for a player.
    pub fn save_level_state(
        &self,
        uid: &str,
        level_id: LevelId,
        state: serde_json::Map<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<LevelState, DevQuestError> {
        let saved = LevelState {
            uid: uid.to_string(),
            level_id,
            state,
            timestamp: now,
        };
        self.repo.save_level_state(&saved)?;
        Ok(saved)
    }

    /// The state a player last saved for a level.
    pub fn level_state(
        &self,
        uid: &str,
        level_id: LevelId,
    ) -> Result<Option<LevelState>, DevQuestError> {
        self.repo.level_state(uid, level_id)
    }

    pub fn exit_game(&self, uid: &str, now: DateTime<Utc>) -> Result<GameSession, DevQuestError> {
        self.repo.record_exit(uid, now)
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    fn user(&self, uid: &str) -> Result<User, DevQuestError> {
        self.repo
            .user(uid)?
            .ok_or_else(|| DevQuestError::UserNotFound(uid.to_string()))
    }

    fn playable(&self, uid: &str, level_id: LevelId) -> Result<Level, DevQuestError> {
        let level = self.get_level(level_id)?;
        let user = self.user(uid)?;
        if !user.can_play(level_id) {
            return Err(DevQuestError::LevelLocked {
                uid: uid.to_string(),
                level: level_id,
            });
        }
        Ok(level)
    }

    fn settle(
        &self,
        uid: &str,
        level_id: LevelId,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<Settlement, DevQuestError> {
        let store = self.repo.store();
        let retry = self.repo.retry();
        let upsert = ProgressUpserter::new(store, retry).record(uid, level_id, outcome, now)?;
        let (_, unlocked) =
            UnlockPropagator::new(store, retry).propagate(uid, level_id, outcome.stars)?;
        let progress = self.repo.user_progress(uid)?;
        let completed = levels_completed(&progress);
        Ok(Settlement {
            upsert,
            unlocked,
            progress,
            levels_completed: completed,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::UpsertKind;
    use crate::store::{InMemoryStore, RetryPolicy};
    use crate::{CommandEntry, Role, Stars};
    use std::sync::Arc;

    fn service() -> GameService {
        let repo = Repository::new(Arc::new(InMemoryStore::new()), RetryPolicy::none());
        let shelves = LevelDraft {
            name: "Estanterías".to_string(),
            description: "Ordena las estanterías".to_string(),
            max_score: 300,
            order: 1,
            estimated_time: 5,
            list_commands: BTreeMap::from([
                (
                    "ESTANTES".to_string(),
                    CommandEntry::Slots(BTreeMap::from([
                        ("a".to_string(), "ESTANTE1".to_string()),
                        ("b".to_string(), "ESTANTE2".to_string()),
                    ])),
                ),
                ("CONDICION".to_string(), CommandEntry::Single("IF".to_string())),
            ]),
            ..LevelDraft::default()
        };
        let potions = LevelDraft {
            name: "Pociones".to_string(),
            description: "Prepara las pociones".to_string(),
            max_score: 90,
            order: 2,
            estimated_time: 8,
            potions_config: BTreeMap::from([("VENENO".to_string(), 3), ("SALUD".to_string(), 2)]),
            perfect_score: Some(3),
            ..LevelDraft::default()
        };
        repo.put_level(&shelves.into_level(LevelId(1))).expect("seed");
        repo.put_level(&potions.into_level(LevelId(2))).expect("seed");
        GameService::new(repo)
    }

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn perfect_commands_unlock_next_level() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");

        let result = svc
            .validate_commands("u1", LevelId(1), &tokens(&["ESTANTE1", "ESTANTE2", "IF"]), Utc::now())
            .expect("validate");
        assert_eq!(result.grade.stars, Stars::PERFECT);
        assert_eq!(result.settlement.upsert.kind, UpsertKind::Created);
        assert_eq!(result.settlement.upsert.record.score, 300);
        assert_eq!(result.settlement.unlocked, Some(LevelId(2)));
        assert_eq!(result.settlement.levels_completed, vec![LevelId(1)]);
    }

    #[test]
    fn locked_level_is_refused() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        let potions = BTreeMap::from([("VENENO".to_string(), 3)]);
        let result = svc.validate_potions("u1", LevelId(2), &potions, &[], Utc::now());
        assert!(matches!(result, Err(DevQuestError::LevelLocked { .. })));
    }

    #[test]
    fn unknown_level_and_user_are_not_found() {
        let svc = service();
        let result = svc.validate_commands("u1", LevelId(99), &[], Utc::now());
        assert!(matches!(result, Err(DevQuestError::LevelNotFound(LevelId(99)))));

        let result = svc.validate_commands("ghost", LevelId(1), &[], Utc::now());
        assert!(matches!(result, Err(DevQuestError::UserNotFound(_))));
    }

    #[test]
    fn potions_after_unlock_grade_blocks() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        svc.validate_commands("u1", LevelId(1), &tokens(&["IF"]), Utc::now())
            .expect("unlock");

        let potions = BTreeMap::from([("VENENO".to_string(), 3), ("SALUD".to_string(), 2)]);
        let result = svc
            .validate_potions("u1", LevelId(2), &potions, &tokens(&["a", "b", "c", "d"]), Utc::now())
            .expect("validate");
        assert_eq!(result.grade.stars, Stars::new(2));
        assert_eq!(result.settlement.upsert.record.score, 60);
        assert_eq!(result.settlement.levels_completed, vec![LevelId(1), LevelId(2)]);
    }

    #[test]
    fn failed_attempt_is_recorded_but_not_completed() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        let result = svc
            .validate_commands("u1", LevelId(1), &tokens(&["WHILE"]), Utc::now())
            .expect("validate");
        assert!(!result.grade.correct());
        assert_eq!(result.settlement.unlocked, None);
        assert_eq!(result.settlement.progress.len(), 1);
        assert!(result.settlement.levels_completed.is_empty());
    }

    #[test]
    fn manual_score_derives_stars() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        let settlement = svc
            .record_score("u1", LevelId(1), 200, Utc::now())
            .expect("record");
        assert_eq!(settlement.upsert.record.stars, Stars::new(2));
        assert_eq!(settlement.unlocked, Some(LevelId(2)));
    }

    #[test]
    fn only_admins_create_levels() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        let draft = LevelDraft {
            name: "Bucles".to_string(),
            order: 3,
            ..LevelDraft::default()
        };
        let refused = svc.create_level("u1", draft.clone());
        assert!(matches!(refused, Err(DevQuestError::Forbidden(_))));

        let mut admin = User::new("root", "root@devquest.test", "root", Utc::now());
        admin.role = Role::Admin;
        svc.repository().insert_user(&admin).expect("admin");
        let level = svc.create_level("root", draft).expect("create");
        assert_eq!(level.level_id, LevelId(3));
        assert_eq!(svc.list_levels().expect("list").len(), 3);
    }

    #[test]
    fn admins_play_locked_levels() {
        let svc = service();
        let mut admin = User::new("root", "root@devquest.test", "root", Utc::now());
        admin.role = Role::Admin;
        svc.repository().insert_user(&admin).expect("admin");
        let potions = BTreeMap::from([("VENENO".to_string(), 3), ("SALUD".to_string(), 2)]);
        let result = svc
            .validate_potions("root", LevelId(2), &potions, &tokens(&["a"]), Utc::now())
            .expect("validate");
        assert_eq!(result.grade.stars, Stars::PERFECT);
    }

    #[test]
    fn statistics_include_requesting_player_progress() {
        let svc = service();
        for uid in ["u1", "u2"] {
            svc.register_user(uid, &format!("{}@devquest.test", uid), uid, Utc::now())
                .expect("register");
        }
        svc.validate_commands("u1", LevelId(1), &tokens(&["ESTANTE1", "ESTANTE2", "IF"]), Utc::now())
            .expect("u1");
        svc.validate_commands("u2", LevelId(1), &tokens(&["WHILE"]), Utc::now())
            .expect("u2");

        let report = svc.level_statistics("u2", LevelId(1)).expect("stats");
        assert_eq!(report.statistics.total_attempts, 2);
        assert_eq!(report.statistics.completed_count, 1);
        assert_eq!(report.statistics.average_stars_hundredths, 150);
        assert_eq!(report.progress.len(), 1);
        assert!(report.levels_completed.is_empty());

        let empty = svc.level_statistics("u2", LevelId(2)).expect("stats");
        assert_eq!(empty.statistics, LevelStatistics::default());
    }

    #[test]
    fn registering_again_keeps_unlocked_levels() {
        let svc = service();
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        svc.validate_commands("u1", LevelId(1), &tokens(&["ESTANTE1", "ESTANTE2", "IF"]), Utc::now())
            .expect("pass level 1");

        let again = svc.register_user("u1", "ana@devquest.test", "otra", Utc::now());
        assert!(matches!(again, Err(DevQuestError::Conflict(_))));
        assert!(svc.email_registered("ana@devquest.test").expect("lookup"));
        assert!(!svc.email_registered("luis@devquest.test").expect("lookup"));

        let user = svc.repository().user("u1").expect("get").expect("present");
        assert_eq!(user.username, "ana");
        assert_eq!(user.unlocked_levels, vec![LevelId(1), LevelId(2)]);
        assert_eq!(svc.progress("u1").expect("progress").len(), 1);
    }

    #[test]
    fn saved_level_state_is_returned() {
        let svc = service();
        let mut state = serde_json::Map::new();
        state.insert("blocks".to_string(), serde_json::json!(["IF"]));
        svc.save_level_state("u1", LevelId(1), state.clone(), Utc::now())
            .expect("save");
        let saved = svc.level_state("u1", LevelId(1)).expect("load").expect("present");
        assert_eq!(saved.state, state);
        assert_eq!(svc.level_state("u1", LevelId(2)).expect("load"), None);
    }

    #[test]
    fn login_requires_user_document() {
        let svc = service();
        assert!(matches!(
            svc.login("ghost", Utc::now()),
            Err(DevQuestError::UserNotFound(_))
        ));
        svc.register_user("u1", "ana@devquest.test", "ana", Utc::now())
            .expect("register");
        let (user, completed) = svc.login("u1", Utc::now()).expect("login");
        assert_eq!(user.username, "ana");
        assert!(completed.is_empty());
    }

    #[test]
    fn completed_levels_are_sorted_and_distinct() {
        let record = |level: u32, stars: u8| ProgressRecord {
            progress_id: ProgressRecord::key("u", LevelId(level)),
            user_id: "u".to_string(),
            level_id: LevelId(level),
            stars: Stars::new(stars),
            score: 0,
            start_date: Utc::now(),
            completion_date: None,
            solution: None,
        };
        let records = vec![record(3, 1), record(1, 2), record(2, 0), record(3, 3)];
        assert_eq!(levels_completed(&records), vec![LevelId(1), LevelId(3)]);
    }
}
