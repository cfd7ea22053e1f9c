//! Authentication extractors.
//!
//! Resolves the caller's [`TenantIdentity`] from a bearer token, or from the
//! token stored in the session cookie by `POST /auth/login`.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tower_sessions::Session;
use tracing::Span;

use crate::error::{AppError, set_sentry_identity};
use crate::models::session::keys;
use crate::services::auth::AuthError;
use crate::services::tenant::{AuthToken, TenantIdentity};
use crate::state::AppState;

/// Extractor that requires a valid login token.
///
/// Rejects with 401 when no token is presented or it is unknown, expired
/// or revoked, and with 403 when the user or organization is inactive.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireTenant(identity): RequireTenant,
/// ) -> impl IntoResponse {
///     format!("Acting in {}", identity.organization_id())
/// }
/// ```
pub struct RequireTenant(pub TenantIdentity);

impl FromRequestParts<AppState> for RequireTenant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = presented_token(parts).await else {
            tracing::warn!(reason = "missing_token", "authentication failed");
            return Err(AuthError::Unauthenticated.into());
        };

        let identity = state.resolver().resolve(&token).await?;

        let span = Span::current();
        span.record("organization_id", tracing::field::display(identity.organization_id()));
        span.record("user_id", tracing::field::display(identity.user_id()));
        set_sentry_identity(&identity);

        Ok(Self(identity))
    }
}

/// Extractor for whatever token the caller presented, without resolving it.
///
/// Unlike `RequireTenant`, this never rejects. Used by logout, which must
/// work for tokens that have already expired.
pub struct PresentedToken(pub Option<AuthToken>);

impl<S> FromRequestParts<S> for PresentedToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(presented_token(parts).await))
    }
}

/// The token the caller presented, bearer header first.
pub async fn presented_token(parts: &Parts) -> Option<AuthToken> {
    if let Some(token) = bearer_token(parts) {
        return Some(token);
    }

    let session = parts.extensions.get::<Session>()?;
    session
        .get::<String>(keys::AUTH_TOKEN)
        .await
        .ok()
        .flatten()
        .map(AuthToken::from_raw)
}

fn bearer_token(parts: &Parts) -> Option<AuthToken> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(AuthToken::from_raw(token))
}

/// Helper to store the login token in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_auth_token(
    session: &Session,
    token: &AuthToken,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::AUTH_TOKEN, token.expose()).await
}

/// Helper to clear the login token from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_auth_token(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<String>(keys::AUTH_TOKEN).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/me");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        let parts = parts_with(Some("Bearer abc123"));
        assert_eq!(bearer_token(&parts).unwrap().expose(), "abc123");

        let parts = parts_with(Some("bearer   abc123 "));
        assert_eq!(bearer_token(&parts).unwrap().expose(), "abc123");
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        assert!(bearer_token(&parts_with(Some("Basic dXNlcjpwYXNz"))).is_none());
        assert!(bearer_token(&parts_with(Some("Bearer "))).is_none());
        assert!(bearer_token(&parts_with(Some("abc123"))).is_none());
        assert!(bearer_token(&parts_with(None)).is_none());
    }

    #[tokio::test]
    async fn test_presented_token_without_session() {
        let parts = parts_with(None);
        assert!(presented_token(&parts).await.is_none());
    }
}
