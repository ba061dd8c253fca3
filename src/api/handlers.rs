//! Generic CRUD and search handlers, instantiated once per [`Resource`].

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use rollbook_core::{Document, Fields, Filter, Record, RecordStore, StoreError};
use serde::Serialize;
use serde_json::Value;

use super::{AppState, Resource};
use crate::{config::UnknownFieldPolicy, error::ApiError};

/// Keys a client may echo back from a fetched record; they are never stored
/// from a request body.
const SERVER_KEYS: [&str; 3] = ["_id", "createdAt", "updatedAt"];

/// Runs a store call on the blocking pool against the shared handle.
pub(crate) async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
}

fn to_record<R: Resource>(doc: Document, action: &str) -> Result<Record<R>, ApiError> {
    Record::try_from(doc).map_err(|e| ApiError::store(action, R::SINGULAR, e))
}

fn encode(payload: impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(payload).map_err(|e| ApiError::Internal {
        message: "Failed to encode response.".into(),
        detail: e.to_string(),
    })
}

/// `{ "message": ..., <key>: payload }`, or just `{ <key>: payload }`.
fn envelope(message: Option<String>, key: &str, payload: impl Serialize) -> Result<Json<Value>, ApiError> {
    let payload = encode(payload)?;
    let mut body = Fields::new();
    if let Some(message) = message {
        body.insert("message".into(), Value::String(message));
    }
    body.insert(key.into(), payload);
    Ok(Json(Value::Object(body)))
}

fn check_unknown_fields<R: Resource>(policy: UnknownFieldPolicy, body: &Fields) -> Result<(), ApiError> {
    if policy == UnknownFieldPolicy::Ignore {
        return Ok(());
    }
    let schema = R::COLLECTION.schema();
    match body
        .keys()
        .find(|k| !SERVER_KEYS.contains(&k.as_str()) && !schema.is_known(k))
    {
        Some(key) => Err(ApiError::BadRequest(format!("Unknown field: {}.", key))),
        None => Ok(()),
    }
}

pub async fn list<R: Resource>(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let docs = run_blocking(&state, |store| store.find(R::COLLECTION, &Filter::Everything))
        .await
        .map_err(|e| ApiError::store("fetch", R::PLURAL, e))?;
    let records = docs
        .into_iter()
        .map(|doc| to_record::<R>(doc, "fetch"))
        .collect::<Result<Vec<_>, _>>()?;

    if R::WRAP_LIST {
        envelope(None, R::PLURAL, records)
    } else {
        encode(records).map(Json)
    }
}

pub async fn create<R: Resource>(
    State(state): State<AppState>,
    body: Result<Json<Fields>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    check_unknown_fields::<R>(state.unknown_fields, &body)?;

    // Conform first so dates and numeric strings reach the typed shape in
    // their stored form.
    let conformed = R::COLLECTION
        .schema()
        .conform(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let entity: R =
        serde_json::from_value(Value::Object(conformed)).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let fields = entity.to_fields().map_err(|e| ApiError::store("add", R::SINGULAR, e))?;

    let doc = run_blocking(&state, move |store| store.insert(R::COLLECTION, &fields))
        .await
        .map_err(|e| ApiError::store("add", R::SINGULAR, e))?;
    let record = to_record::<R>(doc, "add")?;
    tracing::info!(collection = %R::COLLECTION, id = %record.id, "record added");

    let body = envelope(Some(format!("{} added successfully.", R::LABEL)), R::CREATED_KEY, record)?;
    Ok((StatusCode::CREATED, body))
}

pub async fn update<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Fields>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = body?;
    check_unknown_fields::<R>(state.unknown_fields, &patch)?;
    let patch: Fields = patch
        .into_iter()
        .filter(|(k, _)| !SERVER_KEYS.contains(&k.as_str()))
        .collect();

    let updated = run_blocking(&state, move |store| store.update_by_id(R::COLLECTION, &id, &patch))
        .await
        .map_err(|e| ApiError::store("update", R::SINGULAR, e))?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found.", R::LABEL)))?;
    let record = to_record::<R>(updated, "update")?;
    tracing::info!(collection = %R::COLLECTION, id = %record.id, "record updated");

    envelope(Some(format!("{} updated successfully.", R::LABEL)), R::UPDATED_KEY, record)
}

pub async fn remove<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = run_blocking(&state, move |store| store.delete_by_id(R::COLLECTION, &id))
        .await
        .map_err(|e| ApiError::store("remove", R::SINGULAR, e))?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found.", R::LABEL)))?;
    let record = to_record::<R>(removed, "remove")?;
    tracing::info!(collection = %R::COLLECTION, id = %record.id, "record removed");

    envelope(Some(format!("{} removed successfully.", R::LABEL)), R::REMOVED_KEY, record)
}

pub async fn fetch<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let doc = run_blocking(&state, move |store| store.find_by_id(R::COLLECTION, &id))
        .await
        .map_err(|e| ApiError::store("fetch", R::SINGULAR, e))?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found.", R::LABEL)))?;
    envelope(None, R::SINGULAR, to_record::<R>(doc, "fetch")?)
}

pub async fn search<R: Resource>(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let filter = R::search_filter(&params)?;
    tracing::debug!(collection = %R::COLLECTION, ?filter, "search");

    let docs = run_blocking(&state, move |store| store.find(R::COLLECTION, &filter))
        .await
        .map_err(|e| ApiError::store("search", R::PLURAL, e))?;
    if docs.is_empty() {
        return Err(ApiError::NotFound(R::NO_MATCHES.into()));
    }
    let records = docs
        .into_iter()
        .map(|doc| to_record::<R>(doc, "search"))
        .collect::<Result<Vec<_>, _>>()?;
    envelope(None, R::PLURAL, records)
}
