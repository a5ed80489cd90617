use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Wire shape for an error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// HTTP status code
    pub status: u16,
}

/// Errors surfaced by the REST and WebSocket gateway.
///
/// `SessionNotFound` is a client-visible outcome, never retried. Storage
/// failures are logged and reported as a server-side failure without leaking
/// backend internals to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Storage(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::SessionNotFound(id) => {
                format!("Session with ID '{}' not found", id)
            }
            AppError::Validation(reason) => reason.clone(),
            AppError::Storage(e) => {
                error!("Storage backend failure: {}", e);
                "An unexpected error occurred".to_string()
            }
        };
        let body = ApiError {
            message,
            code: self.code().to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
