//! Organization repository.
//!
//! Organizations are the tenant roots and are managed by operator tooling,
//! so these queries are not tenant-scoped.

use sqlx::{PgConnection, PgPool};

use super::{RepositoryError, map_write_error};
use crate::models::Organization;

const COLUMNS: &str = "id, name, slug, is_active, created_at, updated_at";

/// Repository for organization database operations.
pub struct OrganizationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrganizationRepository<'a> {
    /// Create a new organization repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an organization by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>, RepositoryError> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            "SELECT {COLUMNS} FROM organizations WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(org)
    }

    /// List every organization, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Organization>, RepositoryError> {
        let orgs = sqlx::query_as::<_, Organization>(&format!(
            "SELECT {COLUMNS} FROM organizations ORDER BY created_at, id"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(orgs)
    }

    /// Activate or deactivate an organization. A deactivated organization's
    /// users can no longer authenticate; its data is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no organization has this slug.
    pub async fn set_active(&self, slug: &str, active: bool) -> Result<Organization, RepositoryError> {
        sqlx::query_as::<_, Organization>(&format!(
            "UPDATE organizations SET is_active = $2, updated_at = NOW() \
             WHERE slug = $1 RETURNING {COLUMNS}"
        ))
        .bind(slug)
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

/// Insert an organization on an existing connection (onboarding runs this
/// in the same transaction as the owner's user row).
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the slug is taken, or
/// `RepositoryError::Invalid` if it violates the slug format.
pub async fn insert(
    conn: &mut PgConnection,
    name: &str,
    slug: &str,
) -> Result<Organization, RepositoryError> {
    sqlx::query_as::<_, Organization>(&format!(
        "INSERT INTO organizations (name, slug) VALUES ($1, $2) RETURNING {COLUMNS}"
    ))
    .bind(name)
    .bind(slug)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_write_error)
}
