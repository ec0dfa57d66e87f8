use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy for the whole REST surface. Each variant carries the
/// terse user-visible message; the status mapping lives in `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// A soft lock or pending record is already occupied.
    Busy(String),
    /// An interaction id no longer matches the held lock.
    InvalidState(String),
    /// The targeted entity or pending record does not exist.
    NotFound(String),
    /// Caller is not a participant of the targeted interaction.
    Forbidden(String),
    /// A rating row could not be locked in time; safe to retry.
    ResourceBusy(String),
    Validation(String),
    AuthFailure(String),
    Database(sqlx::Error),
    /// States the data model rules out; reaching one is a server bug.
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::Busy(msg)
            | ApiError::InvalidState(msg)
            | ApiError::NotFound(msg)
            | ApiError::Forbidden(msg)
            | ApiError::ResourceBusy(msg)
            | ApiError::Validation(msg)
            | ApiError::AuthFailure(msg)
            | ApiError::Internal(msg) => write!(f, "{}", msg),
            ApiError::Database(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Busy(_) | ApiError::InvalidState(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            ApiError::ResourceBusy(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            // Don't leak driver internals to clients.
            ApiError::Database(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
