//! Request handlers
//!
//! Maps store results onto HTTP statuses.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::KvError;

/// Body of a successful `GET /db/:key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueResponse {
    pub key: String,
    pub value: String,
}

/// Body of `POST /db/:key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub value: String,
}

/// An error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<KvError> for ApiError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::KeyNotFound => Self {
                status: StatusCode::NOT_FOUND,
                message: KvError::KeyNotFound.to_string(),
            },
            other => {
                tracing::warn!("Store request failed: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// `GET /db/:key`
pub async fn get_value(
    State(engine): State<Arc<Engine>>,
    Path(key): Path<String>,
) -> Result<Json<ValueResponse>, ApiError> {
    let lookup = key.clone();
    let value = run_blocking(move || engine.get(lookup.as_bytes())).await?;
    let value = String::from_utf8(value)
        .map_err(|_| ApiError::internal(format!("value for {} is not valid UTF-8", key)))?;

    Ok(Json(ValueResponse { key, value }))
}

/// `POST /db/:key`
pub async fn put_value(
    State(engine): State<Arc<Engine>>,
    Path(key): Path<String>,
    payload: Result<Json<PutRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    run_blocking(move || engine.put(key.as_bytes(), request.value.as_bytes())).await?;
    Ok(StatusCode::OK)
}

/// `GET /health`
pub async fn health() -> &'static str {
    "OK"
}

/// Run a store call on the blocking pool
async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::internal(format!("store task failed: {}", e))),
    }
}
