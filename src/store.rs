use std::sync::Arc;

use rollbook_core::{RecordStore, StoreError};
use rollbook_memory::InMemoryStore;
use rollbook_postgres::PostgresStore;
use rollbook_sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreConfig};

const DEFAULT_SQLITE_PATH: &str = "rollbook.db";

/// Opens the configured backend. Blocking: the PostgreSQL client must not be
/// created on an async worker thread.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Memory => {
            if config.url.is_some() {
                tracing::warn!("store.url is ignored by the memory backend");
            }
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Sqlite => {
            let path = config.url.as_deref().unwrap_or(DEFAULT_SQLITE_PATH);
            Arc::new(SqliteStore::new(path)?)
        }
        StoreBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Backend("store.url is required for the postgres backend".into()))?;
            Arc::new(PostgresStore::new(url)?)
        }
    };
    tracing::info!(backend = store.backend_name(), "Record store ready");
    Ok(store)
}

/// Releases the last store handle on the blocking pool; backend drops may
/// block on I/O.
pub async fn close_store(store: Arc<dyn RecordStore>) {
    let backend = store.backend_name();
    if let Err(e) = tokio::task::spawn_blocking(move || drop(store)).await {
        tracing::warn!(backend, error = %e, "failed to close record store");
    }
}
