//! Tenant context resolution.
//!
//! Turns a presented login token into the [`TenantIdentity`] every scoped
//! data call requires. The identity can only be built here (and by the
//! onboarding paths in [`crate::services::auth`]), never from request data.

use std::time::Duration;

use autohaul_core::{OrganizationId, UserId, UserRole};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::db::{RepositoryError, auth_tokens};
use crate::services::auth::AuthError;

/// Random bytes in a freshly issued token.
const TOKEN_BYTES: usize = 32;

/// The authenticated caller: who they are and which organization they act in.
///
/// Deliberately has no `Deserialize` impl and no public constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    organization_id: OrganizationId,
    user_id: UserId,
    role: UserRole,
}

impl TenantIdentity {
    pub(crate) const fn new(organization_id: OrganizationId, user_id: UserId, role: UserRole) -> Self {
        Self {
            organization_id,
            user_id,
            role,
        }
    }

    /// Identity used by operator tooling (CLI onboarding) to act inside an
    /// organization without a logged-in user.
    pub(crate) const fn operator(organization_id: OrganizationId) -> Self {
        Self::new(
            organization_id,
            UserId::new(uuid::Uuid::nil()),
            UserRole::Owner,
        )
    }

    #[must_use]
    pub const fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub const fn role(&self) -> UserRole {
        self.role
    }
}

/// An opaque bearer token.
///
/// Only its SHA-256 digest is ever stored.
pub struct AuthToken(SecretString);

impl AuthToken {
    /// Issue a fresh random token.
    pub(crate) fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(SecretString::from(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Wrap a token presented by a client.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// The raw token, for handing back to the client once.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Hex digest stored in `auth_tokens.token_hash`.
    pub(crate) fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.expose_secret().as_bytes()))
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Resolves login tokens to tenant identities.
#[derive(Clone)]
pub struct TenantResolver {
    pool: PgPool,
    timeout: Duration,
}

impl TenantResolver {
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Resolve a token to the caller's identity.
    ///
    /// Fails closed: a missing, expired or revoked token is
    /// `Unauthenticated`, and a token whose user or organization has been
    /// deactivated is `AccountInactive`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated`, `AuthError::AccountInactive`, or
    /// `AuthError::Repository` if the lookup fails or times out.
    pub async fn resolve(&self, token: &AuthToken) -> Result<TenantIdentity, AuthError> {
        let principal =
            tokio::time::timeout(self.timeout, auth_tokens::find_principal(&self.pool, &token.digest()))
                .await
                .map_err(|_| RepositoryError::Timeout)?
                .map_err(RepositoryError::from)?;

        let Some(principal) = principal else {
            tracing::warn!(reason = "unknown_token", "authentication failed");
            return Err(AuthError::Unauthenticated);
        };

        if principal.expires_at <= Utc::now() {
            tracing::warn!(
                reason = "expired_token",
                user_id = %principal.user_id,
                "authentication failed"
            );
            return Err(AuthError::Unauthenticated);
        }

        if !principal.user_active {
            tracing::warn!(
                reason = "user_inactive",
                user_id = %principal.user_id,
                "authentication failed"
            );
            return Err(AuthError::AccountInactive);
        }

        if !principal.organization_active {
            tracing::warn!(
                reason = "organization_inactive",
                user_id = %principal.user_id,
                organization_id = %principal.organization_id,
                "authentication failed"
            );
            return Err(AuthError::AccountInactive);
        }

        Ok(TenantIdentity::new(
            principal.organization_id,
            principal.user_id,
            principal.role,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique_and_url_safe() {
        let a = AuthToken::generate();
        let b = AuthToken::generate();
        assert_ne!(a.expose(), b.expose());
        // 32 bytes -> 43 base64 characters without padding
        assert_eq!(a.expose().len(), 43);
        assert!(
            a.expose()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_digest_is_stable_sha256_hex() {
        let token = AuthToken::from_raw("abc");
        assert_eq!(
            token.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(token.digest(), AuthToken::from_raw("abc").digest());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AuthToken::from_raw("super-secret-token");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn test_operator_identity_is_owner_with_nil_user() {
        let org = OrganizationId::generate();
        let identity = TenantIdentity::operator(org);
        assert_eq!(identity.organization_id(), org);
        assert_eq!(identity.role(), UserRole::Owner);
        assert!(identity.user_id().as_uuid().is_nil());
    }
}
