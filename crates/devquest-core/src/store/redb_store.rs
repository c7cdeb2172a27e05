//! # redb-backed Document Store
//!
//! A disk-backed document store using the redb embedded database.
//!
//! Each collection is one redb table mapping the document id to the document
//! encoded as JSON bytes. redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The single-writer model is what makes [`DocumentStore::modify`] atomic:
//! the read, the caller's decision and the write share one write transaction.

use super::{Collection, Document, DocumentStore, Modify, StoreError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table definition for a collection: document id -> JSON bytes.
fn table(collection: Collection) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(collection.name())
}

/// Transaction begin/commit failures: another process may hold the file or
/// the disk may be momentarily busy, so these are worth retrying.
fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn io(e: impl std::fmt::Display) -> StoreError {
    StoreError::Io(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<Document, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode(document: &Document) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(document).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// A disk-backed document store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path, creating every collection table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(unavailable)?;

        let write_txn = db.begin_write().map_err(unavailable)?;
        for collection in Collection::ALL {
            let _ = write_txn.open_table(table(collection)).map_err(io)?;
        }
        write_txn.commit().map_err(unavailable)?;

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        self.db.compact().map_err(io)?;
        Ok(())
    }
}

impl DocumentStore for RedbStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;

        match docs.get(id).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, Document)>, StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;

        let mut out = Vec::new();
        for entry in docs.iter().map_err(io)? {
            let (key, value) = entry.map_err(io)?;
            out.push((key.value().to_string(), decode(value.value())?));
        }
        Ok(out)
    }

    fn set(
        &self,
        collection: Collection,
        id: &str,
        document: &Document,
    ) -> Result<(), StoreError> {
        let bytes = encode(document)?;

        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut docs = write_txn.open_table(table(collection)).map_err(io)?;
            docs.insert(id, bytes.as_slice()).map_err(io)?;
        }
        write_txn.commit().map_err(unavailable)
    }

    fn modify(
        &self,
        collection: Collection,
        id: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> Result<Modify, StoreError>,
    ) -> Result<Option<Document>, StoreError> {
        let write_txn = self.db.begin_write().map_err(unavailable)?;

        let outcome = {
            let mut docs = write_txn.open_table(table(collection)).map_err(io)?;
            let current = match docs.get(id).map_err(io)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };

            match decide(current.as_ref()) {
                Ok(Modify::Keep) => Ok(current),
                Ok(Modify::Write(document)) => {
                    let bytes = encode(&document)?;
                    docs.insert(id, bytes.as_slice()).map_err(io)?;
                    Ok(Some(document))
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(stored) => {
                write_txn.commit().map_err(unavailable)?;
                Ok(stored)
            }
            Err(e) => {
                write_txn.abort().map_err(io)?;
                Err(e)
            }
        }
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let docs = read_txn.open_table(table(collection)).map_err(io)?;
        let len = docs.len().map_err(io)?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }
}

// =============================================================================
// TESTS
// =============================================================================
