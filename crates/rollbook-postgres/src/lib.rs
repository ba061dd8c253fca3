//! PostgreSQL record store.
//!
//! Same layout as the SQLite backend: one `documents` table with a JSONB
//! body per row, and a partial unique index per unique schema field.

use std::sync::Mutex;

use postgres::{
    error::SqlState,
    types::{Json, ToSql},
    Client, NoTls, Row,
};
use rollbook_core::{Collection, Document, Fields, Filter, RecordId, RecordStore, StoreError};
use time::OffsetDateTime;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, body, created_at, updated_at";

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| StoreError::Backend(format!("PostgreSQL connection failed: {}", e)))?;

        let store = Self {
            client: Mutex::new(client),
        };
        store.init_schema()?;
        tracing::info!("PostgreSQL record store connected");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        client
            .batch_execute(
                "
            CREATE TABLE IF NOT EXISTS documents (
                seq BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                id TEXT NOT NULL UNIQUE,
                body JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection, seq);
            ",
            )
            .map_err(backend)?;

        for collection in Collection::ALL {
            for spec in collection.schema().unique_fields() {
                client
                    .batch_execute(&format!(
                        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((body->>'{}')) WHERE collection = '{}';",
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

fn backend(e: postgres::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Maps a unique index violation back to the schema field it guards.
fn write_error(collection: Collection, e: postgres::Error) -> StoreError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let constraint = e.as_db_error().and_then(|db| db.constraint()).unwrap_or_default();
        let violated = collection
            .schema()
            .unique_fields()
            .find(|spec| constraint == unique_index_name(collection, spec.name));
        if let Some(spec) = violated {
            return StoreError::Duplicate {
                field: spec.name,
                label: spec.label,
            };
        }
    }
    backend(e)
}

fn decode(row: &Row) -> Result<Document, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let Json(fields): Json<Fields> = row
        .try_get("body")
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e)))?;
    Ok(Document {
        fields,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        id: RecordId::new(id),
    })
}

/// Renders `filter` as a WHERE clause fragment over `$n` parameters;
/// `params` already holds the collection as `$1`.
fn filter_sql(filter: &Filter, params: &mut Vec<String>) -> String {
    match filter {
        Filter::Everything => "TRUE".to_string(),
        Filter::Equals { field, value } => {
            let field = bind(params, field.clone());
            let value = bind(params, value.clone());
            format!("body->>({}::text) = {}::text", field, value)
        }
        Filter::ContainsIgnoreCase { field, needle } => {
            let field = bind(params, field.clone());
            let needle = bind(params, needle.clone());
            format!("strpos(lower(body->>({}::text)), lower({}::text)) > 0", field, needle)
        }
        Filter::Or(filters) if filters.is_empty() => "FALSE".to_string(),
        Filter::Or(filters) => join(filters, " OR ", params),
        Filter::And(filters) if filters.is_empty() => "TRUE".to_string(),
        Filter::And(filters) => join(filters, " AND ", params),
    }
}

fn bind(params: &mut Vec<String>, value: String) -> String {
    params.push(value);
    format!("${}", params.len())
}

fn join(filters: &[Filter], op: &str, params: &mut Vec<String>) -> String {
    let parts: Vec<String> = filters.iter().map(|f| filter_sql(f, params)).collect();
    format!("({})", parts.join(op))
}

impl RecordStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn insert(&self, collection: Collection, fields: &Fields) -> Result<Document, StoreError> {
        let fields = collection.schema().conform(fields)?;
        let id = Uuid::new_v4().simple().to_string();
        let now = OffsetDateTime::now_utc();

        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO documents (collection, id, body, created_at, updated_at) VALUES ($1, $2, $3, $4, $4) RETURNING {}",
                    SELECT_COLUMNS
                ),
                &[&collection.as_str(), &id, &Json(&fields), &now],
            )
            .map_err(|e| write_error(collection, e))?;
        let doc = decode(&row)?;
        tracing::debug!(collection = %collection, id = %doc.id, "Document inserted");
        Ok(doc)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM documents WHERE collection = $1 AND id = $2", SELECT_COLUMNS),
                &[&collection.as_str(), &id],
            )
            .map_err(backend)?;
        row.as_ref().map(decode).transpose()
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let mut params = vec![collection.as_str().to_string()];
        let clause = filter_sql(filter, &mut params);
        let sql = format!(
            "SELECT {} FROM documents WHERE collection = $1 AND {} ORDER BY seq",
            SELECT_COLUMNS, clause
        );
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let rows = client.query(&sql, &args).map_err(backend)?;
        rows.iter().map(decode).collect()
    }

    fn update_by_id(&self, collection: Collection, id: &str, patch: &Fields) -> Result<Option<Document>, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let mut tx = client.transaction().map_err(backend)?;

        let current = tx
            .query_opt(
                &format!(
                    "SELECT {} FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
                    SELECT_COLUMNS
                ),
                &[&collection.as_str(), &id],
            )
            .map_err(backend)?;
        let current = match current {
            Some(row) => decode(&row)?,
            None => return Ok(None),
        };

        let fields = collection.schema().conform(&current.merged_fields(patch))?;
        let row = tx
            .query_one(
                &format!(
                    "UPDATE documents SET body = $1, updated_at = $2 WHERE collection = $3 AND id = $4 RETURNING {}",
                    SELECT_COLUMNS
                ),
                &[&Json(&fields), &OffsetDateTime::now_utc(), &collection.as_str(), &id],
            )
            .map_err(|e| write_error(collection, e))?;
        let updated = decode(&row)?;
        tx.commit().map_err(backend)?;
        tracing::debug!(collection = %collection, id, "Document updated");
        Ok(Some(updated))
    }

    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let row = client
            .query_opt(
                &format!(
                    "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING {}",
                    SELECT_COLUMNS
                ),
                &[&collection.as_str(), &id],
            )
            .map_err(backend)?;
        if row.is_some() {
            tracing::debug!(collection = %collection, id, "Document deleted");
        }
        row.as_ref().map(decode).transpose()
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let mut client = self.client.lock().map_err(|_| StoreError::Poisoned)?;
        let n: i64 = client
            .query_one(
                "SELECT COUNT(*) FROM documents WHERE collection = $1",
                &[&collection.as_str()],
            )
            .map_err(backend)?
            .get(0);
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    /// These tests need a live server; they are skipped unless
    /// `ROLLBOOK_TEST_POSTGRES_URL` is set.
    fn store() -> Option<PostgresStore> {
        let url = std::env::var("ROLLBOOK_TEST_POSTGRES_URL").ok()?;
        Some(PostgresStore::new(&url).expect("connect to test database"))
    }

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn teacher(email: &str) -> Fields {
        fields(json!({
            "firstName": "Ada", "lastName": "Lovelace", "email": email,
            "phone": "555", "subject": "Math"
        }))
    }

    #[test]
    fn test_postgres_crud_round_trip() {
        let Some(store) = store() else { return };
        let email = format!("{}@x.com", Uuid::new_v4().simple());

        let doc = store.insert(Collection::Teachers, &teacher(&email)).unwrap();
        let err = store.insert(Collection::Teachers, &teacher(&email)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email", .. }), "{:?}", err);

        let updated = store
            .update_by_id(Collection::Teachers, doc.id.as_str(), &fields(json!({"subject": "Logic"})))
            .unwrap()
            .unwrap();
        assert_eq!(updated.text("subject"), Some("Logic"));
        assert_eq!(updated.text("email"), Some(email.as_str()));

        let hits = store
            .find(Collection::Teachers, &Filter::equals("email", email.clone()))
            .unwrap();
        assert_eq!(hits.len(), 1);

        let removed = store.delete_by_id(Collection::Teachers, doc.id.as_str()).unwrap();
        assert!(removed.is_some());
        assert!(store.find_by_id(Collection::Teachers, doc.id.as_str()).unwrap().is_none());
    }

    #[test]
    fn test_postgres_missing_ids() {
        let Some(store) = store() else { return };
        assert!(store
            .update_by_id(Collection::Exams, "does-not-exist", &fields(json!({"remarks": "x"})))
            .unwrap()
            .is_none());
        assert!(store.delete_by_id(Collection::Exams, "does-not-exist").unwrap().is_none());
    }
}
