use crate::{
    filter::Filter,
    models::{Collection, Document, Fields},
    schema::ValidationError,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),
    #[error("{label} already exists.")]
    Duplicate {
        field: &'static str,
        label: &'static str,
    },
    #[error("stored document is corrupt: {0}")]
    Corrupt(String),
    #[error("{0}")]
    Backend(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// A document store holding one collection per school entity.
///
/// Calls are blocking; async callers should run them on a blocking thread.
/// Each call touches a single document (or reads one collection) and is
/// atomic with respect to that document only.
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;

    fn insert(&self, collection: Collection, fields: &Fields) -> Result<Document, StoreError>;
    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;
    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError>;
    fn update_by_id(&self, collection: Collection, id: &str, patch: &Fields) -> Result<Option<Document>, StoreError>;
    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;
    fn count(&self, collection: Collection) -> Result<usize, StoreError>;
}
