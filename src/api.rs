//! Route tables and shared request state.
//!
//! Every entity gets the same five routes under `/api/{collection}`; the
//! teacher table additionally exposes `GET /:id`. The store handle is created
//! once at startup and shared through [`AppState`].

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use rollbook_core::{
    Attendance, Collection, Exam, ExamResult, RecordStore, SchoolClass, Student, Teacher,
};
use serde_json::json;

use crate::{admin, config::UnknownFieldPolicy, telemetry};

pub mod handlers;
pub mod resources;

pub use resources::Resource;

pub const TEACHERS_PATH: &str = "/api/teachers";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub unknown_fields: UnknownFieldPolicy,
    pub body_limit_bytes: usize,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            unknown_fields: UnknownFieldPolicy::default(),
            body_limit_bytes: 1024 * 1024,
            metrics: None,
        }
    }

    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

fn resource_routes<R: Resource>() -> Router<AppState> {
    let by_id = put(handlers::update::<R>).delete(handlers::remove::<R>);
    let by_id = if R::FETCH_BY_ID {
        by_id.get(handlers::fetch::<R>)
    } else {
        by_id
    };

    Router::new()
        .route("/", get(handlers::list::<R>).post(handlers::create::<R>))
        .route("/search", get(handlers::search::<R>))
        .route("/:id", by_id)
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit_bytes;
    Router::new()
        .nest("/api/students", resource_routes::<Student>())
        .nest(TEACHERS_PATH, resource_routes::<Teacher>())
        .nest("/api/classes", resource_routes::<SchoolClass>())
        .nest("/api/exams", resource_routes::<Exam>())
        .nest("/api/attendance", resource_routes::<Attendance>())
        .nest("/api/results", resource_routes::<ExamResult>())
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/admin/teachers", get(admin::teacher_page))
        .route_layer(middleware::from_fn(telemetry::track_requests))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    let backend = state.store.backend_name();
    let counted = handlers::run_blocking(&state, |store| {
        Collection::ALL
            .into_iter()
            .map(|c| store.count(c).map(|n| (c.as_str(), n)))
            .collect::<Result<BTreeMap<_, _>, _>>()
    })
    .await;

    match counted {
        Ok(records) => Json(json!({ "status": "ok", "backend": backend, "records": records })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "backend": backend, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
