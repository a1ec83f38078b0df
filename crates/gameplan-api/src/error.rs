use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use gameplan_auth::AuthError;
use gameplan_upstream::UpstreamError;

/// Request-scoped failure. Every variant maps to one status code and a
/// stable machine code; the human-readable message is the Display text and
/// never carries internal detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// One message for unknown-email and wrong-password alike.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_failure"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(source) = &self {
            error!("internal error: {source:#}");
        }

        let (status, code) = self.status_and_code();
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::Unauthorized => {
                ApiError::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::SessionNotFound => ApiError::NotFound("Refresh token not found".to_string()),
            AuthError::InvalidResetCode => {
                ApiError::Validation("Invalid or expired verification code".to_string())
            }
            AuthError::UnknownEmail => ApiError::NotFound("Email not found".to_string()),
            AuthError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidPayload => ApiError::Validation("Invalid payload".to_string()),
            UpstreamError::InvalidSignature => ApiError::Validation("Invalid signature".to_string()),
            other => {
                error!("upstream failure: {other}");
                ApiError::Upstream("Upstream service unavailable".to_string())
            }
        }
    }
}

/// Distinguish a UNIQUE-constraint insert failure (a concurrent duplicate)
/// from genuine store trouble.
pub(crate) fn conflict_on_unique(err: anyhow::Error, message: &str) -> ApiError {
    let is_constraint = err
        .downcast_ref::<rusqlite::Error>()
        .and_then(|e| e.sqlite_error_code())
        == Some(rusqlite::ErrorCode::ConstraintViolation);

    if is_constraint {
        ApiError::Conflict(message.to_string())
    } else {
        ApiError::Internal(err)
    }
}
