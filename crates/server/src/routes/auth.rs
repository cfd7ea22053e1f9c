//! Authentication route handlers.
//!
//! Password login issues a bearer token and also stores it in the session,
//! so either the `Authorization` header or the session cookie works.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::{AppError, Result, clear_sentry_user};
use crate::middleware::{PresentedToken, clear_auth_token, set_auth_token};
use crate::services::tenant::TenantIdentity;
use crate::state::AppState;

/// Login request body.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Login response body. The token is shown once and stored only as a hash.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub identity: TenantIdentity,
}

/// Handle login.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let login = state.auth().login(&request.email, &request.password).await?;

    set_auth_token(&session, &login.token)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    Ok(Json(LoginResponse {
        token: login.token.expose().to_owned(),
        expires_at: login.expires_at,
        identity: login.identity,
    }))
}

/// Handle logout.
///
/// Revokes whatever token was presented and clears the session. Logging
/// out without a token, or with one that is already invalid, still succeeds.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    PresentedToken(token): PresentedToken,
) -> Result<StatusCode> {
    if let Some(token) = token {
        state.auth().logout(&token).await?;
    }

    clear_auth_token(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();

    Ok(StatusCode::NO_CONTENT)
}
