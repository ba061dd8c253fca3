//! HTTP-facing error type.
//!
//! Handlers are the only error boundary: every failure is turned into a status
//! code and a JSON body here, with no retries.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rollbook_core::StoreError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing query parameter, malformed body, failed validation or a
    /// duplicate unique field.
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// Any other failure; `detail` carries the raw underlying message.
    #[error("{message}: {detail}")]
    Internal { message: String, detail: String },
}

impl ApiError {
    /// Classifies a store failure raised while `action`-ing `noun`
    /// (e.g. "add" / "teacher").
    pub fn store(action: &str, noun: &str, err: StoreError) -> Self {
        match err {
            StoreError::Invalid(e) => ApiError::BadRequest(e.to_string()),
            dup @ StoreError::Duplicate { .. } => ApiError::BadRequest(dup.to_string()),
            other => ApiError::Internal {
                message: format!("Failed to {} {}.", action, noun),
                detail: other.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorBody { message, error: None }),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, ErrorBody { message, error: None }),
            ApiError::Internal { message, detail } => {
                tracing::error!(error = %detail, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        message,
                        error: Some(detail),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Failures that stop the process before it starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    #[error("server error: {0}")]
    Server(String),
}
