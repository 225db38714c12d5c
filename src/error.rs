// =============================================================================
// ERROR MODULE
// =============================================================================
// Custom error type for the service and its HTTP responses.
//
// - Workflow errors (NotFound, DuplicateInterest, AlreadyDecided, ...) are
//   recoverable at the request boundary and map to 4xx/503.
// - Infrastructure errors (database, Redis) map to 500 without leaking
//   internal details to clients.
// - A catalog store write conflict is not an error here: the workflow engine
//   retries it and only surfaces `Unavailable` once retries run out.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// -----------------------------------------------------------------------------
// ERROR ENUM
// -----------------------------------------------------------------------------
// LEARNING NOTE:
// #[error("...")] generates the Display impl; that text is what clients see
// in the `message` field for 4xx errors.
//
// #[from] generates From<sqlx::Error> and From<redis::RedisError>, which is
// what lets `?` turn a failed query straight into an AppError inside any
// function returning AppResult.
#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // WORKFLOW ERRORS
    // -------------------------------------------------------------------------
    /// Crop or interest entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user already has an interest in this crop's ledger
    #[error("You have already sent interest for this crop")]
    DuplicateInterest,

    /// The interest is no longer pending
    #[error("Interest already accepted or rejected")]
    AlreadyDecided,

    /// Acceptance would take the crop below zero under the reject policy
    #[error("Insufficient quantity: available {available}, requested {requested}")]
    InsufficientQuantity { available: i64, requested: i64 },

    /// Concurrent writers kept winning the race; the caller may retry later
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Missing or malformed request field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // -------------------------------------------------------------------------
    // INFRASTRUCTURE ERRORS
    // -------------------------------------------------------------------------
    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis operation failed
    #[error("Cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::DuplicateInterest => (StatusCode::BAD_REQUEST, "DUPLICATE_INTEREST"),
            AppError::AlreadyDecided => (StatusCode::BAD_REQUEST, "ALREADY_DECIDED"),
            AppError::InsufficientQuantity { .. } => {
                (StatusCode::CONFLICT, "INSUFFICIENT_QUANTITY")
            }
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
// LEARNING NOTE:
// Handlers return AppResult<T>. Axum calls into_response() on the Err side,
// so a handler can use `?` and still answer with a JSON error body:
//
//   { "error": "DUPLICATE_INTEREST", "message": "You have already sent ..." }
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Don't expose internal details for 5xx infrastructure failures
        let message = match &self {
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Redis(_) => "A cache error occurred".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error_code = error_code, error = %self, "Request failed");
        } else {
            tracing::warn!(error_code = error_code, message = %message, "Request rejected");
        }

        let body = match &self {
            AppError::InsufficientQuantity {
                available,
                requested,
            } => ErrorResponse::with_details(
                error_code,
                message,
                format!("available={} requested={}", available, requested),
            ),
            _ => ErrorResponse::new(error_code, message),
        };
        (status, Json(body)).into_response()
    }
}

/// Result alias used across the service.
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::NotFound("crop".into()).status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DuplicateInterest.status_and_code(),
            (StatusCode::BAD_REQUEST, "DUPLICATE_INTEREST")
        );
        assert_eq!(
            AppError::AlreadyDecided.status_and_code(),
            (StatusCode::BAD_REQUEST, "ALREADY_DECIDED")
        );
        assert_eq!(
            AppError::InsufficientQuantity {
                available: 1,
                requested: 2
            }
            .status_and_code()
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unavailable("busy".into()).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn database_errors_hide_details() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn anyhow_converts_to_internal() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, AppError::Internal(msg) if msg == "boom"));
    }
}
