// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every layer (models, services, repository, handlers) reports failures through it,
/// so callers can classify an error by its variant regardless of where it originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 400 Bad Request: missing identifiers, malformed answer map
    InvalidArgument(String),

    // 404 Not Found: attempt or question set does not exist
    NotFound(String),

    // 409 Conflict: attempt already completed
    FailedPrecondition(String),

    // 401 Unauthorized: caller identity missing
    Unauthenticated(String),

    // 500 Internal Server Error: storage failure, retries exhausted, deadline exceeded
    Internal(String),

    // Optimistic write conflict detected by the store. Consumed by the transaction
    // retry loop; only reaches a caller if something bypasses that loop.
    Aborted(String),
}

impl AppError {
    /// Prefixes the message with `ctx`, keeping the variant intact.
    pub fn context(self, ctx: &str) -> Self {
        match self {
            AppError::InvalidArgument(msg) => AppError::InvalidArgument(format!("{ctx}: {msg}")),
            AppError::NotFound(msg) => AppError::NotFound(format!("{ctx}: {msg}")),
            AppError::FailedPrecondition(msg) => {
                AppError::FailedPrecondition(format!("{ctx}: {msg}"))
            }
            AppError::Unauthenticated(msg) => AppError::Unauthenticated(format!("{ctx}: {msg}")),
            AppError::Internal(msg) => AppError::Internal(format!("{ctx}: {msg}")),
            AppError::Aborted(msg) => AppError::Aborted(format!("{ctx}: {msg}")),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Aborted(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) | AppError::Aborted(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::FailedPrecondition(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Postgres SQLSTATEs raised when a SERIALIZABLE transaction loses a conflict.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Converts `sqlx::Error` into `AppError`.
/// Serialization failures become `Aborted` so the transaction is retried from fresh reads.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err)
                if matches!(
                    db_err.code().as_deref(),
                    Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
                ) =>
            {
                AppError::Aborted(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidArgument(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidArgument(err.to_string())
    }
}
