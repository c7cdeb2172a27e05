//! # Document Store
//!
//! The narrow contract DevQuest needs from its persistence layer: keyed
//! collections of JSON documents supporting get-by-id, query-by-field-equality,
//! set, update, and one atomic conditional read-modify-write.
//!
//! ## Backends
//!
//! - [`InMemoryStore`]: mutex-guarded maps (fast, volatile; used by tests and `--backend memory`)
//! - [`RedbStore`]: redb embedded database, one table per collection (ACID, persistent)
//!
//! ## Atomicity
//!
//! [`DocumentStore::modify`] runs the caller's decision function and the write
//! inside one critical section (a redb write transaction, or the memory mutex).
//! Progress upserts and unlock propagation go through it, so concurrent
//! submissions for the same document serialize instead of losing updates.

mod memory;
mod redb_store;
mod retry;

pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
pub use retry::RetryPolicy;

use serde_json::Value;
use thiserror::Error;

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, Value>;

// =============================================================================
// COLLECTIONS
// =============================================================================

/// The keyed collections DevQuest stores documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Users,
    Levels,
    Progress,
    LevelStates,
    GameSessions,
}

impl Collection {
    /// Every collection, in a fixed order.
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Levels,
        Collection::Progress,
        Collection::LevelStates,
        Collection::GameSessions,
    ];

    /// Stable collection name, also used as the redb table name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Levels => "levels",
            Collection::Progress => "progress",
            Collection::LevelStates => "level_states",
            Collection::GameSessions => "game_sessions",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failures reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not serve the call right now; retrying may succeed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend failed in a way retrying will not fix.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A document could not be encoded or decoded.
    #[error("Document serialization error: {0}")]
    Serialization(String),

    /// `update` targeted a document that does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },

    /// A conditional write found the document in an unexpected state.
    #[error("Document conflict: {collection}/{id}")]
    Conflict {
        collection: &'static str,
        id: String,
    },
}

impl StoreError {
    /// Whether the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

// =============================================================================
// TYPED DOCUMENTS
// =============================================================================

/// Encode a typed record as a document. Records must serialize to JSON objects.
pub fn to_document<T: serde::Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

/// Decode a document into a typed record.
pub fn from_document<T: serde::de::DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Outcome of a `modify` decision function.
#[derive(Debug, Clone, PartialEq)]
pub enum Modify {
    /// Leave the stored document as it is.
    Keep,
    /// Replace (or create) the document.
    Write(Document),
}

/// Keyed JSON document collections.
///
/// Implementations must be safe to share across request handlers.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Get a document by id.
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    /// Every document of a collection, ordered by id.
    fn list(&self, collection: Collection) -> Result<Vec<(String, Document)>, StoreError>;

    /// Create or replace a document.
    fn set(&self, collection: Collection, id: &str, document: &Document)
    -> Result<(), StoreError>;

    /// Atomically read a document, decide, and optionally write.
    ///
    /// `decide` sees the current document (or `None`) and returns whether to
    /// keep it or write a replacement; both happen without any other writer
    /// interleaving. Returns the document as stored afterwards. An error from
    /// `decide` aborts without writing. `decide` may be called again if the
    /// whole call is retried.
    fn modify(
        &self,
        collection: Collection,
        id: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> Result<Modify, StoreError>,
    ) -> Result<Option<Document>, StoreError>;

    /// Documents whose top-level `field` equals `value`, ordered by id.
    fn query_eq(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self
            .list(collection)?
            .into_iter()
            .filter(|(_, doc)| doc.get(field) == Some(value))
            .collect())
    }

    /// Merge `fields` into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] when the document does not exist.
    fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: &Document,
    ) -> Result<Document, StoreError> {
        let updated = self.modify(collection, id, &mut |current| match current {
            Some(doc) => {
                let mut merged = doc.clone();
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Modify::Write(merged))
            }
            None => Err(StoreError::NotFound {
                collection: collection.name(),
                id: id.to_string(),
            }),
        })?;
        updated.ok_or_else(|| StoreError::NotFound {
            collection: collection.name(),
            id: id.to_string(),
        })
    }

    /// Number of documents in a collection.
    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        Ok(self.list(collection)?.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_stable() {
        let names: Vec<_> = Collection::ALL.iter().map(Collection::name).collect();
        assert_eq!(
            names,
            vec!["users", "levels", "progress", "level_states", "game_sessions"]
        );
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("busy".into()).is_transient());
        assert!(!StoreError::Io("disk".into()).is_transient());
        assert!(!StoreError::Serialization("bad".into()).is_transient());
    }
}
