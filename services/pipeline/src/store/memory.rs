use super::{DocumentStore, Namespace, StoreError};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process document store with MongoDB-like equality filters.
///
/// Used by tests and local runs. [`MemoryStore::set_unavailable`] makes every
/// operation fail, which is how error paths are exercised.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Namespace, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure mode
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a collection in insertion order
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.collections.read().get(ns).cloned().unwrap_or_default()
    }

    pub fn len(&self, ns: &Namespace) -> usize {
        self.collections.read().get(ns).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, ns: &Namespace) -> bool {
        self.len(ns) == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

/// Top-level field equality, the subset of query semantics the services use
fn filter_matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(&self, ns: &Namespace, document: Document) -> Result<Bson, StoreError> {
        self.check_available()?;

        // Mongo assigns `_id` first when the client leaves it out
        let (id, document) = match document.get("_id").cloned() {
            Some(id) => (id, document),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert("_id", id.clone());
                for (key, value) in document {
                    with_id.insert(key, value);
                }
                (id, with_id)
            }
        };

        self.collections
            .write()
            .entry(ns.clone())
            .or_default()
            .push(document);

        Ok(id)
    }

    async fn find_one(
        &self,
        ns: &Namespace,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.check_available()?;

        Ok(self
            .collections
            .read()
            .get(ns)
            .and_then(|docs| docs.iter().find(|d| filter_matches(d, &filter)).cloned()))
    }

    async fn find_all(&self, ns: &Namespace, filter: Document) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;

        Ok(self
            .collections
            .read()
            .get(ns)
            .map(|docs| docs.iter().filter(|d| filter_matches(d, &filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn close(&self) {}
}
