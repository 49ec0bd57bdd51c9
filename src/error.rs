use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{storage::StorageError, token::TokenError};

/// Result alias used by every core operation.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// The failure taxonomy shared by the Access Guard, the Document Workflow and the
/// handlers. Each variant maps to exactly one HTTP status in `IntoResponse`; the
/// transport layer never decides a status on its own.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, forged or expired credentials (401).
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated, but not allowed to touch this resource (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The referenced entity does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request data failed validation (400).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The transition is not legal from the current state (409).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Store, storage or signing failure. The message is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable name of the taxonomy kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::PreconditionFailed(_) => "precondition_failed",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::PreconditionFailed(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The reason string shown to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidInput(msg)
            | AppError::PreconditionFailed(msg) => msg.clone(),
            AppError::Internal(_) => "internal server error".to_string(),
        }
    }
}

/// ErrorResponse
///
/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!("internal error: {}", detail);
        }
        let body = ErrorResponse {
            error: self.public_message(),
            kind: self.kind().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// StoreError
///
/// Failure reported by a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conflicting record: {0}")]
    Conflict(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Internal(err.to_string())
    }
}

// Token failures are collapsed here; the specific kind is only visible in logs.
impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        tracing::debug!(reason = ?err, "token rejected");
        AppError::Unauthenticated("invalid token".to_string())
    }
}
