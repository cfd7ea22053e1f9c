//! Login token storage.
//!
//! Tokens are stored only as their SHA-256 hex digest, so a leaked
//! database does not leak usable credentials.

use autohaul_core::{OrganizationId, UserId, UserRole};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};

/// Everything the resolver needs to decide on a token, loaded in one query.
#[derive(Debug, Clone, FromRow)]
pub struct Principal {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: UserRole,
    pub expires_at: DateTime<Utc>,
    pub user_active: bool,
    pub organization_active: bool,
}

/// Look up the user and organization behind a token digest.
///
/// # Errors
///
/// Returns `sqlx::Error` if the query fails.
pub async fn find_principal(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<Principal>, sqlx::Error> {
    sqlx::query_as::<_, Principal>(
        r"
        SELECT u.id AS user_id,
               u.organization_id,
               u.role,
               t.expires_at,
               u.is_active AS user_active,
               o.is_active AS organization_active
        FROM auth_tokens t
        JOIN users u ON u.id = t.user_id
        JOIN organizations o ON o.id = u.organization_id
        WHERE t.token_hash = $1
        ",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

/// Store a new token digest.
///
/// # Errors
///
/// Returns `sqlx::Error` if the insert fails.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    token_hash: &str,
    user_id: UserId,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO auth_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, $3)
        ",
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Delete a token. Returns whether it existed.
///
/// # Errors
///
/// Returns `sqlx::Error` if the delete fails.
pub async fn revoke(pool: &PgPool, token_hash: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every token of a user (used when a user is deactivated).
///
/// # Errors
///
/// Returns `sqlx::Error` if the delete fails.
pub async fn revoke_all_for_user(pool: &PgPool, user_id: UserId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete expired tokens. Returns how many were removed.
///
/// # Errors
///
/// Returns `sqlx::Error` if the delete fails.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
