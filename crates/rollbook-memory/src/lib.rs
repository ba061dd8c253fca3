//! In-process record store.
//!
//! Documents live in per-collection ordered maps keyed by an insertion
//! sequence, so `find` returns records in the order they were created.
//! Unique fields are checked while holding the write lock, which makes the
//! check and the write a single atomic step.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};

use rollbook_core::{Collection, Document, Fields, Filter, RecordId, RecordStore, StoreError};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Default)]
struct CollectionData {
    docs: BTreeMap<u64, Document>,
    ids: HashMap<RecordId, u64>,
}

impl CollectionData {
    fn get(&self, id: &str) -> Option<&Document> {
        let seq = self.ids.get(&RecordId::from(id))?;
        self.docs.get(seq)
    }

    fn check_unique(&self, collection: Collection, fields: &Fields, own_id: Option<&RecordId>) -> Result<(), StoreError> {
        for spec in collection.schema().unique_fields() {
            let value = match fields.get(spec.name) {
                Some(Value::Null) | None => continue,
                Some(v) => v,
            };
            let taken = self
                .docs
                .values()
                .filter(|doc| Some(&doc.id) != own_id)
                .any(|doc| doc.fields.get(spec.name) == Some(value));
            if taken {
                return Err(StoreError::Duplicate {
                    field: spec.name,
                    label: spec.label,
                });
            }
        }
        Ok(())
    }
}

pub struct InMemoryStore {
    collections: RwLock<BTreeMap<Collection, CollectionData>>,
    sequence_counter: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let collections = Collection::ALL
            .into_iter()
            .map(|c| (c, CollectionData::default()))
            .collect();
        Self {
            collections: RwLock::new(collections),
            sequence_counter: AtomicU64::new(1),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::SeqCst)
    }
}

impl RecordStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn insert(&self, collection: Collection, fields: &Fields) -> Result<Document, StoreError> {
        let fields = collection.schema().conform(fields)?;
        let mut collections = self.collections.write().map_err(|_| StoreError::Poisoned)?;
        let data = collections.entry(collection).or_default();
        data.check_unique(collection, &fields, None)?;

        let doc = Document::new(
            RecordId::new(Uuid::new_v4().simple().to_string()),
            fields,
            OffsetDateTime::now_utc(),
        );
        let seq = self.next_sequence();
        data.ids.insert(doc.id.clone(), seq);
        data.docs.insert(seq, doc.clone());
        tracing::debug!(collection = %collection, id = %doc.id, "Document inserted");
        Ok(doc)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().map_err(|_| StoreError::Poisoned)?;
        Ok(collections.get(&collection).and_then(|data| data.get(id)).cloned())
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().map_err(|_| StoreError::Poisoned)?;
        Ok(match collections.get(&collection) {
            Some(data) => data.docs.values().filter(|doc| filter.matches(doc)).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn update_by_id(&self, collection: Collection, id: &str, patch: &Fields) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().map_err(|_| StoreError::Poisoned)?;
        let data = collections.entry(collection).or_default();
        let seq = match data.ids.get(&RecordId::from(id)) {
            Some(seq) => *seq,
            None => return Ok(None),
        };
        let current = match data.docs.get(&seq) {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let fields = collection.schema().conform(&current.merged_fields(patch))?;
        data.check_unique(collection, &fields, Some(&current.id))?;

        let updated = Document {
            id: current.id.clone(),
            fields,
            created_at: current.created_at,
            updated_at: OffsetDateTime::now_utc(),
        };
        data.docs.insert(seq, updated.clone());
        tracing::debug!(collection = %collection, id, "Document updated");
        Ok(Some(updated))
    }

    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().map_err(|_| StoreError::Poisoned)?;
        let data = collections.entry(collection).or_default();
        let removed = data
            .ids
            .remove(&RecordId::from(id))
            .and_then(|seq| data.docs.remove(&seq));
        if removed.is_some() {
            tracing::debug!(collection = %collection, id, "Document deleted");
        }
        Ok(removed)
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let collections = self.collections.read().map_err(|_| StoreError::Poisoned)?;
        Ok(collections.get(&collection).map(|d| d.docs.len()).unwrap_or(0))
    }
}
