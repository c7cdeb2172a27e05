//! # Repository
//!
//! Typed access to the document store. Every call goes through the
//! repository's [`RetryPolicy`]; decoding failures surface as
//! [`DevQuestError::StoreFailure`] instead of being skipped.

use crate::store::{
    Collection, Document, DocumentStore, Modify, RetryPolicy, StoreError, from_document,
    to_document,
};
use crate::{
    DevQuestError, GameSession, Level, LevelDraft, LevelId, LevelState, ProgressRecord, Role, User,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

fn codec(source: StoreError) -> DevQuestError {
    DevQuestError::StoreFailure {
        attempts: 1,
        source,
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(
    documents: Vec<(String, Document)>,
) -> Result<Vec<T>, DevQuestError> {
    documents
        .into_iter()
        .map(|(_, doc)| from_document(doc).map_err(codec))
        .collect()
}

/// Typed gateway over an injected [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl Repository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    // =========================================================================
    // LEVELS
    // =========================================================================

    /// Get a level by id.
    pub fn level(&self, id: LevelId) -> Result<Option<Level>, DevQuestError> {
        let key = id.to_string();
        self.retry
            .run(|| self.store.get(Collection::Levels, &key))?
            .map(|doc| from_document(doc).map_err(codec))
            .transpose()
    }

    /// All levels, ordered by their `order` field, then by id.
    pub fn levels(&self) -> Result<Vec<Level>, DevQuestError> {
        let mut levels: Vec<Level> =
            decode_all(self.retry.run(|| self.store.list(Collection::Levels))?)?;
        levels.sort_by_key(|level| (level.draft.order, level.level_id));
        Ok(levels)
    }

    /// Create a level with the next free id (highest existing id + 1).
    ///
    /// The insert only succeeds if the id is still free; a concurrent creator
    /// that took it first turns this call into a conflict.
    pub fn create_level(&self, draft: LevelDraft) -> Result<Level, DevQuestError> {
        let highest = self
            .levels()?
            .iter()
            .map(|level| level.level_id)
            .max()
            .unwrap_or(LevelId(0));
        let level = draft.into_level(highest.next());
        let key = level.level_id.to_string();
        let document = to_document(&level).map_err(codec)?;

        self.retry.run(|| {
            self.store.modify(Collection::Levels, &key, &mut |current| match current {
                Some(_) => Err(StoreError::Conflict {
                    collection: Collection::Levels.name(),
                    id: key.clone(),
                }),
                None => Ok(Modify::Write(document.clone())),
            })
        })?;
        Ok(level)
    }

    /// Create or replace a level under its own id.
    pub fn put_level(&self, level: &Level) -> Result<(), DevQuestError> {
        let key = level.level_id.to_string();
        let document = to_document(level).map_err(codec)?;
        self.retry
            .run(|| self.store.set(Collection::Levels, &key, &document))
    }

    // =========================================================================
    // USERS
    // =========================================================================

    /// Get a user by uid.
    pub fn user(&self, uid: &str) -> Result<Option<User>, DevQuestError> {
        self.retry
            .run(|| self.store.get(Collection::Users, uid))?
            .map(|doc| from_document(doc).map_err(codec))
            .transpose()
    }

    /// The user registered under `email`, if any. Emails compare exactly.
    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, DevQuestError> {
        let value = json!(email);
        let users: Vec<User> =
            decode_all(self.retry.run(|| self.store.query_eq(Collection::Users, "email", &value))?)?;
        Ok(users.into_iter().next())
    }

    /// Store a new user document under its uid.
    ///
    /// An existing document is never replaced: its unlocked levels only grow
    /// through unlock propagation. A taken uid is a conflict.
    pub fn insert_user(&self, user: &User) -> Result<(), DevQuestError> {
        let document = to_document(user).map_err(codec)?;
        self.retry.run(|| {
            self.store.modify(Collection::Users, &user.uid, &mut |current| match current {
                Some(_) => Err(StoreError::Conflict {
                    collection: Collection::Users.name(),
                    id: user.uid.clone(),
                }),
                None => Ok(Modify::Write(document.clone())),
            })
        })?;
        Ok(())
    }

    /// Change the role of an existing user.
    pub fn set_role(&self, uid: &str, role: Role) -> Result<User, DevQuestError> {
        let mut fields = Document::new();
        fields.insert("role".to_string(), json!(role));
        self.update_user(uid, &fields)
    }

    /// Stamp `last_login` on an existing user.
    pub fn touch_last_login(&self, uid: &str, now: DateTime<Utc>) -> Result<User, DevQuestError> {
        let mut fields = Document::new();
        fields.insert("last_login".to_string(), json!(now));
        self.update_user(uid, &fields)
    }

    fn update_user(&self, uid: &str, fields: &Document) -> Result<User, DevQuestError> {
        let updated = self.retry.run(|| {
            match self.store.update(Collection::Users, uid, fields) {
                Ok(doc) => Ok(Some(doc)),
                Err(StoreError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })?;

        let document = updated.ok_or_else(|| DevQuestError::UserNotFound(uid.to_string()))?;
        from_document(document).map_err(codec)
    }

    // =========================================================================
    // PROGRESS
    // =========================================================================

    /// Every progress record of a user, ordered by document id.
    pub fn user_progress(&self, uid: &str) -> Result<Vec<ProgressRecord>, DevQuestError> {
        let value = json!(uid);
        decode_all(
            self.retry
                .run(|| self.store.query_eq(Collection::Progress, "user_id", &value))?,
        )
    }

    /// Every progress record of a level.
    pub fn level_progress(&self, level: LevelId) -> Result<Vec<ProgressRecord>, DevQuestError> {
        let value = json!(level);
        decode_all(
            self.retry
                .run(|| self.store.query_eq(Collection::Progress, "level_id", &value))?,
        )
    }

    // =========================================================================
    // LEVEL STATE & SESSIONS
    // =========================================================================

    /// Save (overwrite) the resumable state of a level.
    pub fn save_level_state(&self, state: &LevelState) -> Result<(), DevQuestError> {
        let key = LevelState::key(&state.uid, state.level_id);
        let document = to_document(state).map_err(codec)?;
        self.retry
            .run(|| self.store.set(Collection::LevelStates, &key, &document))
    }

    /// Get the saved state of a level, if any.
    pub fn level_state(&self, uid: &str, level: LevelId) -> Result<Option<LevelState>, DevQuestError> {
        let key = LevelState::key(uid, level);
        self.retry
            .run(|| self.store.get(Collection::LevelStates, &key))?
            .map(|doc| from_document(doc).map_err(codec))
            .transpose()
    }

    /// Record that a user left the game.
    pub fn record_exit(&self, uid: &str, now: DateTime<Utc>) -> Result<GameSession, DevQuestError> {
        let session = GameSession {
            uid: uid.to_string(),
            exit: true,
            timestamp: now,
        };
        let document = to_document(&session).map_err(codec)?;
        self.retry
            .run(|| self.store.set(Collection::GameSessions, uid, &document))?;
        Ok(session)
    }

    // =========================================================================
    // HOUSEKEEPING
    // =========================================================================

    /// Document count of every collection.
    pub fn counts(&self) -> Result<Vec<(Collection, usize)>, DevQuestError> {
        Collection::ALL
            .iter()
            .map(|collection| {
                self.retry
                    .run(|| self.store.count(*collection))
                    .map(|count| (*collection, count))
            })
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn repo() -> Repository {
        Repository::new(Arc::new(InMemoryStore::new()), RetryPolicy::none())
    }

    fn draft(name: &str, order: u32) -> LevelDraft {
        LevelDraft {
            name: name.to_string(),
            description: format!("{} description", name),
            max_score: 300,
            order,
            estimated_time: 5,
            ..LevelDraft::default()
        }
    }

    #[test]
    fn created_levels_get_sequential_ids() {
        let repo = repo();
        let first = repo.create_level(draft("one", 1)).expect("create");
        let second = repo.create_level(draft("two", 2)).expect("create");
        assert_eq!(first.level_id, LevelId(1));
        assert_eq!(second.level_id, LevelId(2));
        assert_eq!(repo.level(LevelId(2)).expect("get"), Some(second));
    }

    #[test]
    fn created_level_id_follows_highest_existing() {
        let repo = repo();
        repo.put_level(&draft("seeded", 1).into_level(LevelId(7)))
            .expect("put");
        let created = repo.create_level(draft("next", 2)).expect("create");
        assert_eq!(created.level_id, LevelId(8));
    }

    #[test]
    fn levels_are_sorted_by_order() {
        let repo = repo();
        repo.put_level(&draft("late", 9).into_level(LevelId(1)))
            .expect("put");
        repo.put_level(&draft("early", 1).into_level(LevelId(2)))
            .expect("put");
        let names: Vec<_> = repo
            .levels()
            .expect("levels")
            .into_iter()
            .map(|l| l.draft.name)
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn touch_last_login_requires_user() {
        let repo = repo();
        let result = repo.touch_last_login("nobody", Utc::now());
        assert!(matches!(result, Err(DevQuestError::UserNotFound(_))));

        let user = User::new("u1", "a@b.c", "ana", Utc::now());
        repo.insert_user(&user).expect("insert");
        let later = Utc::now();
        let touched = repo.touch_last_login("u1", later).expect("touch");
        assert_eq!(touched.last_login, Some(later));
        assert_eq!(touched.unlocked_levels, user.unlocked_levels);
    }

    #[test]
    fn existing_user_is_never_replaced() {
        let repo = repo();
        let mut user = User::new("u1", "a@b.c", "ana", Utc::now());
        user.unlocked_levels.push(LevelId(2));
        repo.insert_user(&user).expect("insert");

        let again = User::new("u1", "a@b.c", "intruder", Utc::now());
        assert!(matches!(
            repo.insert_user(&again),
            Err(DevQuestError::Conflict(_))
        ));
        assert_eq!(repo.user("u1").expect("get"), Some(user));
    }

    #[test]
    fn role_change_keeps_progress_fields() {
        let repo = repo();
        let mut user = User::new("u1", "a@b.c", "ana", Utc::now());
        user.unlocked_levels.push(LevelId(2));
        repo.insert_user(&user).expect("insert");

        let admin = repo.set_role("u1", Role::Admin).expect("role");
        assert!(admin.is_admin());
        assert_eq!(admin.unlocked_levels, user.unlocked_levels);
        assert_eq!(
            repo.user_by_email("a@b.c").expect("query").map(|u| u.role),
            Some(Role::Admin)
        );
        assert_eq!(repo.user_by_email("b@b.c").expect("query"), None);
        assert!(matches!(
            repo.set_role("ghost", Role::Admin),
            Err(DevQuestError::UserNotFound(_))
        ));
    }

    #[test]
    fn level_state_round_trip() {
        let repo = repo();
        let mut state = serde_json::Map::new();
        state.insert("blocks".to_string(), json!(["IF", "ELSE"]));
        let saved = LevelState {
            uid: "u1".to_string(),
            level_id: LevelId(3),
            state,
            timestamp: Utc::now(),
        };
        repo.save_level_state(&saved).expect("save");
        assert_eq!(repo.level_state("u1", LevelId(3)).expect("get"), Some(saved));
        assert_eq!(repo.level_state("u1", LevelId(4)).expect("get"), None);
    }

    #[test]
    fn exit_is_recorded_per_user() {
        let repo = repo();
        let session = repo.record_exit("u1", Utc::now()).expect("exit");
        assert!(session.exit);
        let counts = repo.counts().expect("counts");
        assert!(counts.contains(&(Collection::GameSessions, 1)));
        assert!(counts.contains(&(Collection::Users, 0)));
    }
}
