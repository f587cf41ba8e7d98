use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use deepguard_core::error::CoreError;
use deepguard_db::StoreError;
use serde_json::json;

use crate::auth::{AuthError, CredentialError, RejectCode};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, the auth vocabularies, and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce consistent
/// `{"error", "code"}` JSON responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `deepguard_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage error from `deepguard_db`.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The authentication gate refused the request.
    #[error("{0}")]
    Rejected(RejectCode),

    /// A credential flow refused the request.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<RejectCode> for AppError {
    fn from(code: RejectCode) -> Self {
        AppError::Rejected(code)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Credential(e) => AppError::Credential(e),
            AuthError::Core(e) => AppError::Core(e),
            AuthError::Store(e) => AppError::Store(e),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Storage errors ---
            AppError::Store(err) => match err {
                StoreError::Conflict(constraint) => (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                ),
                other => {
                    tracing::error!(error = %other, "Store error");
                    internal()
                }
            },

            // --- Auth vocabularies ---
            AppError::Rejected(code) => (StatusCode::UNAUTHORIZED, code.code(), code.to_string()),
            AppError::Credential(err) => (err.status(), err.code(), err.to_string()),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert("cache-control", HeaderValue::from_static("no-store"));
        }
        response
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
