//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! A record owned by another organization and a record that does not exist
//! produce byte-identical responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::tenant::TenantIdentity;

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Status, client-facing message, and whether the error is the server's fault.
fn repository_response(err: &RepositoryError) -> (StatusCode, String, bool) {
    match err {
        RepositoryError::NotFound | RepositoryError::CrossTenantReference => {
            (StatusCode::NOT_FOUND, "Not found".to_string(), false)
        }
        RepositoryError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string(), false),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), false),
        RepositoryError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg.clone(), false),
        RepositoryError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), false),
        RepositoryError::Timeout => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
            true,
        ),
        RepositoryError::Database(_) if err.is_transient() => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
            true,
        ),
        RepositoryError::Database(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
            true,
        ),
    }
}

impl AppError {
    fn classify(&self) -> (StatusCode, String, bool) {
        match self {
            Self::Database(err) => repository_response(err),
            Self::Auth(err) => match err {
                AuthError::Unauthenticated => (
                    StatusCode::UNAUTHORIZED,
                    "Authentication required".to_string(),
                    false,
                ),
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "Invalid credentials".to_string(),
                    false,
                ),
                AuthError::AccountInactive => (
                    StatusCode::FORBIDDEN,
                    "Account is inactive".to_string(),
                    false,
                ),
                AuthError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), false),
                AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone(), false),
                AuthError::InvalidEmail(_) => (
                    StatusCode::BAD_REQUEST,
                    "Invalid email address".to_string(),
                    false,
                ),
                AuthError::PasswordHash => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    true,
                ),
                AuthError::Repository(err) => repository_response(err),
            },
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                true,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, server_fault) = self.classify();

        // Capture server errors to Sentry
        if server_fault {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a resolved identity.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_identity(identity: &TenantIdentity) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(identity.user_id().to_string()),
            ..Default::default()
        }));
        scope.set_tag("organization_id", identity.organization_id());
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
        scope.remove_tag("organization_id");
    });
}
