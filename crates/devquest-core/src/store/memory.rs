//! In-memory document store.

use super::{Collection, Document, DocumentStore, Modify, StoreError};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type Collections = BTreeMap<Collection, BTreeMap<String, Document>>;

/// Volatile store keeping every collection in ordered maps behind one mutex.
///
/// Holding the mutex for the whole of `modify` gives the same serialization
/// guarantee as a redb write transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: Mutex<Collections>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        // Documents are replaced whole, so a poisoned map is still consistent.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .lock()
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn list(&self, collection: Collection) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self
            .lock()
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn set(
        &self,
        collection: Collection,
        id: &str,
        document: &Document,
    ) -> Result<(), StoreError> {
        self.lock()
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    fn modify(
        &self,
        collection: Collection,
        id: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> Result<Modify, StoreError>,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.lock();
        let docs = collections.entry(collection).or_default();
        match decide(docs.get(id))? {
            Modify::Keep => Ok(docs.get(id).cloned()),
            Modify::Write(document) => {
                docs.insert(id.to_string(), document.clone());
                Ok(Some(document))
            }
        }
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        Ok(self.lock().get(&collection).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn memory_store_conformance() {
        let store = InMemoryStore::new();
        conformance::run_all(&store);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let store = InMemoryStore::new();
        for collection in Collection::ALL {
            assert!(store.list(collection).expect("list").is_empty());
            assert_eq!(store.count(collection).expect("count"), 0);
        }
    }
}
