//! In-memory document store.
//!
//! Used by tests and by local development (`CARBRIDGE_STORE=memory`). Keeps
//! insertion order per collection, which is also the tie-break order for
//! sorted reads, matching the `PostgreSQL` backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    Document, DocumentStore, Filter, ID_FIELD, Sort, StoreError, Update, UpdateResult, ensure_id,
    id_string,
};

/// In-memory document store.
///
/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot of the form `{"collection": [doc, ...]}`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DataCorruption` if the snapshot is not an object of
    /// arrays of objects.
    pub fn from_snapshot(snapshot: Value) -> Result<Self, StoreError> {
        let Value::Object(collections) = snapshot else {
            return Err(StoreError::DataCorruption {
                collection: "*".to_string(),
                detail: "snapshot must be an object keyed by collection".to_string(),
            });
        };

        let mut data = HashMap::new();
        for (name, docs) in collections {
            let Value::Array(docs) = docs else {
                return Err(StoreError::DataCorruption {
                    collection: name,
                    detail: "collection must be an array".to_string(),
                });
            };
            let mut parsed = Vec::with_capacity(docs.len());
            for doc in docs {
                let Value::Object(mut doc) = doc else {
                    return Err(StoreError::DataCorruption {
                        collection: name,
                        detail: "document must be an object".to_string(),
                    });
                };
                ensure_id(&mut doc);
                parsed.push(doc);
            }
            data.insert(name, parsed);
        }

        Ok(Self {
            collections: Arc::new(RwLock::new(data)),
        })
    }

    /// Insert documents without the duplicate check, for test setup.
    pub async fn seed(&self, collection: &str, docs: impl IntoIterator<Item = Value>) {
        let mut guard = self.collections.write().await;
        let entry = guard.entry(collection.to_string()).or_default();
        for doc in docs {
            if let Value::Object(mut doc) = doc {
                ensure_id(&mut doc);
                entry.push(doc);
            }
        }
    }

    /// Snapshot of a collection's documents in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.read().await;
        let mut matched: Vec<Document> = guard
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default();
        drop(guard);

        if let Some(sort) = sort {
            // Stable: ties keep insertion order.
            matched.sort_by(|a, b| sort.compare(a, b));
        }
        Ok(matched)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let mut guard = self.collections.write().await;
        let Some(doc) = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)))
        else {
            return Ok(UpdateResult::default());
        };

        // Apply to a copy so a failed update leaves the document untouched.
        let mut updated = doc.clone();
        update.apply(&mut updated)?;
        let modified = u64::from(updated != *doc);
        *doc = updated;

        Ok(UpdateResult {
            matched: 1,
            modified,
        })
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Value, StoreError> {
        let id = ensure_id(&mut document);
        let id_text = id_string(&document).unwrap_or_default();

        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs
            .iter()
            .any(|existing| existing.get(ID_FIELD) == Some(&id))
        {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id_text,
            });
        }
        docs.push(document);
        Ok(id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
