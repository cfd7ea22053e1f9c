//! Authentication service.
//!
//! Password login issuing opaque bearer tokens, logout, user management
//! within an organization, and operator onboarding of new organizations.

mod error;

pub use error::AuthError;

use std::future::Future;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use autohaul_core::{Email, UserId, UserRole};
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use sqlx::PgPool;

use crate::db::organizations::{self, OrganizationRepository};
use crate::db::scoped::{NewEntity, ScopedStore, insert_scoped};
use crate::db::{RepositoryError, auth_tokens, users};
use crate::models::{NewUser, Organization, User, UserPatch, validate_slug};
use crate::services::tenant::{AuthToken, TenantIdentity};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Upper bound so a huge body cannot make hashing expensive.
const MAX_PASSWORD_LENGTH: usize = 1024;

/// Message for a registration whose email is already in use anywhere.
pub const EMAIL_UNAVAILABLE: &str = "email address is not available";

/// A successful login.
#[derive(Debug)]
pub struct LoginSession {
    pub token: AuthToken,
    pub expires_at: DateTime<Utc>,
    pub identity: TenantIdentity,
}

/// Request to add a user to an organization.
#[derive(Clone, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: UserRole,
}

impl std::fmt::Debug for RegisterUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterUser")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// Operator request to create an organization together with its owner.
#[derive(Debug, Clone)]
pub struct OrganizationSignup {
    pub name: String,
    pub slug: String,
    pub owner: RegisterUser,
}

/// Authentication service.
///
/// Handles login, logout, user management and tenant onboarding.
pub struct AuthService<'a> {
    pool: &'a PgPool,
    token_ttl: TimeDelta,
    timeout: Duration,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, token_ttl: TimeDelta, timeout: Duration) -> Self {
        Self {
            pool,
            token_ttl,
            timeout,
        }
    }

    fn store(&self) -> ScopedStore<'a> {
        ScopedStore::new(self.pool, self.timeout)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, AuthError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| RepositoryError::Timeout)?
            .map_err(AuthError::from)
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Login with email and password and issue a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown or the
    /// password is wrong (indistinguishably), or `AuthError::AccountInactive`
    /// if the user or organization is deactivated.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession, AuthError> {
        let Ok(email) = Email::parse(email) else {
            tracing::warn!(reason = "malformed_email", "login failed");
            return Err(AuthError::InvalidCredentials);
        };

        let record = self
            .bounded(async {
                users::find_login(self.pool, &email)
                    .await
                    .map_err(RepositoryError::from)
            })
            .await?;
        let Some(record) = record else {
            tracing::warn!(reason = "unknown_email", "login failed");
            return Err(AuthError::InvalidCredentials);
        };

        if let Err(e) = verify_password(password, &record.password_hash) {
            tracing::warn!(reason = "wrong_password", user_id = %record.id, "login failed");
            return Err(e);
        }

        if !record.is_active || !record.organization_active {
            tracing::warn!(
                reason = "account_inactive",
                user_id = %record.id,
                organization_id = %record.organization_id,
                "login failed"
            );
            return Err(AuthError::AccountInactive);
        }

        let token = AuthToken::generate();
        let expires_at = Utc::now() + self.token_ttl;
        self.bounded(async {
            auth_tokens::insert(self.pool, &token.digest(), record.id, expires_at)
                .await
                .map_err(RepositoryError::from)
        })
        .await?;

        tracing::info!(
            user_id = %record.id,
            organization_id = %record.organization_id,
            "user logged in"
        );

        Ok(LoginSession {
            token,
            expires_at,
            identity: TenantIdentity::new(record.organization_id, record.id, record.role),
        })
    }

    /// Revoke a token. Revoking an unknown token is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the delete fails.
    pub async fn logout(&self, token: &AuthToken) -> Result<(), AuthError> {
        let revoked = self
            .bounded(async {
                auth_tokens::revoke(self.pool, &token.digest())
                    .await
                    .map_err(RepositoryError::from)
            })
            .await?;
        tracing::debug!(revoked, "logout");
        Ok(())
    }

    /// Remove expired tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the delete fails.
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        let purged = self
            .bounded(async {
                auth_tokens::purge_expired(self.pool)
                    .await
                    .map_err(RepositoryError::from)
            })
            .await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired login tokens");
        }
        Ok(purged)
    }

    // =========================================================================
    // User management
    // =========================================================================

    /// Add a user to the caller's organization.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` unless the caller is an owner or admin
    /// (and an owner when granting the owner role),
    /// `AuthError::InvalidEmail` / `AuthError::WeakPassword` for bad input,
    /// or `AuthError::Repository` (e.g. `Conflict` for a taken email).
    pub async fn register_user(
        &self,
        identity: &TenantIdentity,
        request: RegisterUser,
    ) -> Result<User, AuthError> {
        require_user_manager(identity)?;
        if request.role == UserRole::Owner && identity.role() != UserRole::Owner {
            tracing::warn!(user_id = %identity.user_id(), "non-owner tried to grant owner role");
            return Err(AuthError::Forbidden);
        }
        let new = prepare_user(request)?;
        self.store()
            .create(identity, new)
            .await
            .map_err(mask_email_conflict)
    }

    /// Change a user's name, role or active flag.
    ///
    /// Deactivating a user also revokes all their tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the caller may not manage the
    /// target (checked against the locked row), `AuthError::Repository`
    /// with `Invalid` for a change to the caller's own role or status, or
    /// `NotFound` for a user outside the caller's organization.
    pub async fn update_user(
        &self,
        identity: &TenantIdentity,
        id: UserId,
        patch: UserPatch,
    ) -> Result<User, AuthError> {
        require_user_manager(identity)?;
        if id == identity.user_id()
            && (patch.role.is_some_and(|r| r != identity.role()) || patch.is_active == Some(false))
        {
            return Err(RepositoryError::Invalid(
                "you cannot change your own role or deactivate yourself".to_owned(),
            )
            .into());
        }

        let user = self.store().update(identity, id, patch).await?;
        if !user.is_active {
            let revoked = self
                .bounded(async {
                    auth_tokens::revoke_all_for_user(self.pool, user.id)
                        .await
                        .map_err(RepositoryError::from)
                })
                .await?;
            tracing::info!(user_id = %user.id, revoked, "user deactivated");
        }
        Ok(user)
    }

    /// Remove a user from the caller's organization.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` if the caller may not manage the
    /// target, or `AuthError::Repository` (`Invalid` when deleting oneself,
    /// `NotFound` for a user outside the caller's organization).
    pub async fn delete_user(&self, identity: &TenantIdentity, id: UserId) -> Result<(), AuthError> {
        require_user_manager(identity)?;
        if id == identity.user_id() {
            return Err(RepositoryError::Invalid("you cannot delete yourself".to_owned()).into());
        }
        Ok(self.store().delete::<User>(identity, id).await?)
    }

    // =========================================================================
    // Onboarding (operator tooling)
    // =========================================================================

    /// Create an organization and its first owner in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` with `Invalid` for a bad slug or name,
    /// `Conflict` if the slug or owner email is taken, or the owner's input
    /// errors as for [`register_user`](Self::register_user).
    pub async fn create_organization_with_owner(
        &self,
        signup: OrganizationSignup,
    ) -> Result<(Organization, User), AuthError> {
        validate_slug(&signup.slug)?;
        if signup.name.trim().is_empty() {
            return Err(RepositoryError::Invalid("name cannot be empty".to_owned()).into());
        }
        let owner = prepare_user(RegisterUser {
            role: UserRole::Owner,
            ..signup.owner
        })?;

        let (organization, owner) = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;
                let organization =
                    organizations::insert(&mut tx, signup.name.trim(), &signup.slug).await?;
                let owner = insert_scoped(&mut tx, organization.id, owner).await?;
                tx.commit().await?;
                Ok::<_, RepositoryError>((organization, owner))
            })
            .await?;

        tracing::info!(
            organization_id = %organization.id,
            slug = %organization.slug,
            owner_id = %owner.id,
            "organization created"
        );
        Ok((organization, owner))
    }

    /// Add a user to an organization identified by slug, without a
    /// logged-in caller. For operator tooling only.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` with `NotFound` for an unknown slug,
    /// otherwise as [`register_user`](Self::register_user).
    pub async fn add_user_to_organization(
        &self,
        slug: &str,
        request: RegisterUser,
    ) -> Result<User, AuthError> {
        let organization = OrganizationRepository::new(self.pool)
            .get_by_slug(slug)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let identity = TenantIdentity::operator(organization.id);
        let new = prepare_user(request)?;
        self.store()
            .create(&identity, new)
            .await
            .map_err(mask_email_conflict)
    }
}

/// Emails are unique across all organizations. Report a taken address
/// without naming the constraint, so the response reads the same whether
/// the address belongs to this organization or another.
fn mask_email_conflict(err: RepositoryError) -> AuthError {
    match err {
        RepositoryError::Conflict(_) => {
            RepositoryError::Conflict(EMAIL_UNAVAILABLE.to_owned()).into()
        }
        other => other.into(),
    }
}

fn require_user_manager(identity: &TenantIdentity) -> Result<(), AuthError> {
    if identity.role().can_manage_users() {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %identity.user_id(),
            role = %identity.role(),
            "user management denied"
        );
        Err(AuthError::Forbidden)
    }
}

/// Validate a registration request and hash its password.
fn prepare_user(request: RegisterUser) -> Result<NewUser, AuthError> {
    let email = Email::parse(&request.email)?;
    validate_password(&request.password)?;
    let password_hash = SecretString::from(hash_password(&request.password)?);
    let new = NewUser {
        email,
        name: request.name,
        password_hash,
        role: request.role,
    };
    new.validate()?;
    Ok(new)
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use autohaul_core::OrganizationId;
    use secrecy::ExposeSecret;

    fn request(role: UserRole) -> RegisterUser {
        RegisterUser {
            email: "Dispatch@Acme.test".to_owned(),
            name: "Dana".to_owned(),
            password: "correct horse battery".to_owned(),
            role,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_email_conflict_hides_constraint() {
        let err = mask_email_conflict(RepositoryError::Conflict(
            "duplicate value violates users_email_key".to_owned(),
        ));
        match err {
            AuthError::Repository(RepositoryError::Conflict(msg)) => {
                assert_eq!(msg, EMAIL_UNAVAILABLE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            mask_email_conflict(RepositoryError::Timeout),
            AuthError::Repository(RepositoryError::Timeout)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_password_length_rules() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_prepare_user_normalizes_email_and_hashes() {
        let new = prepare_user(request(UserRole::Dispatcher)).unwrap();
        assert_eq!(new.email.as_str(), "dispatch@acme.test");
        assert!(new.password_hash.expose_secret().starts_with("$argon2id$"));
        assert_eq!(new.role, UserRole::Dispatcher);
    }

    #[test]
    fn test_prepare_user_rejects_bad_email() {
        let mut req = request(UserRole::Viewer);
        req.email = "nope".to_owned();
        assert!(matches!(prepare_user(req), Err(AuthError::InvalidEmail(_))));
    }

    #[test]
    fn test_only_owners_and_admins_manage_users() {
        let org = OrganizationId::generate();
        let user = UserId::generate();
        for (role, allowed) in [
            (UserRole::Owner, true),
            (UserRole::Admin, true),
            (UserRole::Dispatcher, false),
            (UserRole::Viewer, false),
        ] {
            let identity = TenantIdentity::new(org, user, role);
            assert_eq!(require_user_manager(&identity).is_ok(), allowed, "{role}");
        }
    }

    #[test]
    fn test_register_request_debug_redacts_password() {
        let debug = format!("{:?}", request(UserRole::Viewer));
        assert!(!debug.contains("correct horse"));
    }
}
