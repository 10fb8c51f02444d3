//! Error types for speval-orch

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// Domain failures of the orchestration pipeline
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Record store failure
    #[error(transparent)]
    Storage(#[from] speval_common::Error),

    /// Work dispatch mechanism refused or lost a job
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// A downstream stage could not find the upstream output it requires
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Outcome record could not be produced
    #[error("Finalization failed: {0}")]
    Finalization(String),

    /// Parent task or component does not exist (or is not visible to the caller)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for orchestration services
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller did not identify an owner (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// speval-common error
    #[error("Common error: {0}")]
    Common(#[from] speval_common::Error),
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NotFound(msg) => ApiError::NotFound(msg),
            OrchestratorError::Storage(speval_common::Error::NotFound(msg)) => ApiError::NotFound(msg),
            OrchestratorError::Storage(speval_common::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            OrchestratorError::Storage(inner) => ApiError::Common(inner),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => {
                let status = match err {
                    speval_common::Error::NotFound(_) => StatusCode::NOT_FOUND,
                    speval_common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, "COMMON_ERROR", err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
