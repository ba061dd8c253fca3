//! SQLite record store.
//!
//! All collections share one `documents` table; each row carries its
//! collection name and the conformed field map as JSON text. Unique schema
//! fields become partial unique expression indexes, so duplicate values are
//! rejected by SQLite itself rather than by a prior lookup.

use std::sync::Mutex;

use rollbook_core::{Collection, Document, Fields, Filter, RecordId, RecordStore, StoreError};
use rusqlite::{
    ffi, functions::FunctionFlags, params, params_from_iter, Connection, OptionalExtension, Row,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, body, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(backend)?;

        if path != ":memory:" {
            let _mode: String = conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                .map_err(backend)?;
        }
        conn.create_scalar_function(
            "rollbook_icontains",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let haystack: Option<String> = ctx.get(0)?;
                let needle: String = ctx.get(1)?;
                Ok(haystack
                    .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
                    .unwrap_or(false))
            },
        )
        .map_err(backend)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!(path, "SQLite record store opened");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection, seq);
            ",
        )
        .map_err(backend)?;

        for collection in Collection::ALL {
            for spec in collection.schema().unique_fields() {
                conn.execute_batch(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents(json_extract(body, '$.{}')) WHERE collection = '{}';",
                    unique_index_name(collection, spec.name),
                    spec.name,
                    collection.as_str(),
                ))
                .map_err(backend)?;
            }
        }
        Ok(())
    }
}

fn unique_index_name(collection: Collection, field: &str) -> String {
    format!("ux_{}_{}", collection.as_str(), field)
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Maps a unique index violation back to the schema field it guards.
fn write_error(collection: Collection, e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &e {
        if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE {
            let violated = collection
                .schema()
                .unique_fields()
                .find(|spec| message.contains(&unique_index_name(collection, spec.name)));
            if let Some(spec) = violated {
                return StoreError::Duplicate {
                    field: spec.name,
                    label: spec.label,
                };
            }
        }
    }
    backend(e)
}

fn timestamp(ts: OffsetDateTime) -> Result<String, StoreError> {
    ts.format(&Rfc3339).map_err(|e| StoreError::Corrupt(e.to_string()))
}

type RawRow = (String, String, String, String);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((id, body, created_at, updated_at): RawRow) -> Result<Document, StoreError> {
    let fields: Fields = serde_json::from_str(&body).map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e)))?;
    let parse = |s: &str| OffsetDateTime::parse(s, &Rfc3339).map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e)));
    Ok(Document {
        created_at: parse(&created_at)?,
        updated_at: parse(&updated_at)?,
        id: RecordId::new(id),
        fields,
    })
}

fn encode(fields: &Fields) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Renders `filter` as a WHERE clause fragment. Field paths and values are
/// bound as parameters; `params` already holds the collection as `?1`.
fn filter_sql(filter: &Filter, params: &mut Vec<String>) -> String {
    match filter {
        Filter::Everything => "1".to_string(),
        Filter::Equals { field, value } => {
            let path = bind(params, format!("$.{}", field));
            let value = bind(params, value.clone());
            format!("json_extract(body, {}) = {}", path, value)
        }
        Filter::ContainsIgnoreCase { field, needle } => {
            let path = bind(params, format!("$.{}", field));
            let needle = bind(params, needle.clone());
            format!("rollbook_icontains(json_extract(body, {}), {})", path, needle)
        }
        Filter::Or(filters) if filters.is_empty() => "0".to_string(),
        Filter::Or(filters) => join(filters, " OR ", params),
        Filter::And(filters) if filters.is_empty() => "1".to_string(),
        Filter::And(filters) => join(filters, " AND ", params),
    }
}

fn bind(params: &mut Vec<String>, value: String) -> String {
    params.push(value);
    format!("?{}", params.len())
}

fn join(filters: &[Filter], op: &str, params: &mut Vec<String>) -> String {
    let parts: Vec<String> = filters.iter().map(|f| filter_sql(f, params)).collect();
    format!("({})", parts.join(op))
}

impl RecordStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&self, collection: Collection, fields: &Fields) -> Result<Document, StoreError> {
        let fields = collection.schema().conform(fields)?;
        let doc = Document::new(
            RecordId::new(Uuid::new_v4().simple().to_string()),
            fields,
            OffsetDateTime::now_utc(),
        );
        let now = timestamp(doc.created_at)?;

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO documents (collection, id, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![collection.as_str(), doc.id.as_str(), encode(&doc.fields)?, now],
        )
        .map_err(|e| write_error(collection, e))?;
        tracing::debug!(collection = %collection, id = %doc.id, "Document inserted");
        Ok(doc)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE collection = ?1 AND id = ?2", SELECT_COLUMNS),
                params![collection.as_str(), id],
                raw_row,
            )
            .optional()
            .map_err(backend)?;
        row.map(decode).transpose()
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let mut params = vec![collection.as_str().to_string()];
        let clause = filter_sql(filter, &mut params);
        let sql = format!(
            "SELECT {} FROM documents WHERE collection = ?1 AND {} ORDER BY seq",
            SELECT_COLUMNS, clause
        );

        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), raw_row)
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        rows.into_iter().map(decode).collect()
    }

    fn update_by_id(&self, collection: Collection, id: &str, patch: &Fields) -> Result<Option<Document>, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction().map_err(backend)?;

        let current = tx
            .query_row(
                &format!("SELECT {} FROM documents WHERE collection = ?1 AND id = ?2", SELECT_COLUMNS),
                params![collection.as_str(), id],
                raw_row,
            )
            .optional()
            .map_err(backend)?;
        let current = match current {
            Some(row) => decode(row)?,
            None => return Ok(None),
        };

        let updated = Document {
            fields: collection.schema().conform(&current.merged_fields(patch))?,
            updated_at: OffsetDateTime::now_utc(),
            ..current
        };
        tx.execute(
            "UPDATE documents SET body = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
            params![
                encode(&updated.fields)?,
                timestamp(updated.updated_at)?,
                collection.as_str(),
                id
            ],
        )
        .map_err(|e| write_error(collection, e))?;
        tx.commit().map_err(backend)?;
        tracing::debug!(collection = %collection, id, "Document updated");
        Ok(Some(updated))
    }

    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let row = conn
            .query_row(
                &format!(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2 RETURNING {}",
                    SELECT_COLUMNS
                ),
                params![collection.as_str(), id],
                raw_row,
            )
            .optional()
            .map_err(backend)?;
        if row.is_some() {
            tracing::debug!(collection = %collection, id, "Document deleted");
        }
        row.map(decode).transpose()
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection.as_str()],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(n as usize)
    }
}
