/// Unified error handling module
use crate::domain::FanoutErrorKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Pipeline-level failures that end a fanout in the `Error` state
#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("invalid sighting: {0}")]
    InvalidSighting(String),
    #[error("{collaborator} unavailable: {message}")]
    SourceUnavailable {
        collaborator: &'static str,
        message: String,
    },
    #[error("fanout cancelled")]
    Cancelled,
}

impl FanoutError {
    pub fn kind(&self) -> FanoutErrorKind {
        match self {
            FanoutError::InvalidSighting(_) => FanoutErrorKind::InvalidSighting,
            FanoutError::SourceUnavailable { .. } => FanoutErrorKind::SourceUnavailable,
            FanoutError::Cancelled => FanoutErrorKind::Cancelled,
        }
    }

    pub fn source_unavailable(collaborator: &'static str, err: StoreError) -> Self {
        FanoutError::SourceUnavailable {
            collaborator,
            message: err.to_string(),
        }
    }
}

/// Failures of injected storage collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-target push delivery failure
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("no provider registered for {0}")]
    NotRegistered(String),
    #[error("provider rejected message (status {status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InvalidInput(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INPUT", msg.clone())
            }
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg.clone())
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
