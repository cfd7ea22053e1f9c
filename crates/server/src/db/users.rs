//! Cross-tenant user lookups.
//!
//! Login is the one place a user is found without a tenant identity: the
//! email is the global login key. Everything else about users goes through
//! the scoped store.

use autohaul_core::{Email, OrganizationId, UserId, UserRole};
use sqlx::{FromRow, PgPool};

/// The columns login needs, plus the organization's status.
#[derive(Debug, FromRow)]
pub struct LoginRecord {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub role: UserRole,
    pub password_hash: String,
    pub is_active: bool,
    pub organization_active: bool,
}

/// Find the login record for an email address.
///
/// # Errors
///
/// Returns `sqlx::Error` if the query fails.
pub async fn find_login(pool: &PgPool, email: &Email) -> Result<Option<LoginRecord>, sqlx::Error> {
    sqlx::query_as::<_, LoginRecord>(
        r"
        SELECT u.id, u.organization_id, u.role, u.password_hash, u.is_active,
               o.is_active AS organization_active
        FROM users u
        JOIN organizations o ON o.id = u.organization_id
        WHERE u.email = $1
        ",
    )
    .bind(email.as_str())
    .fetch_optional(pool)
    .await
}
