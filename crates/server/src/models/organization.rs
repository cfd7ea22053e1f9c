//! Organizations: the tenants.
//!
//! Not tenant-owned themselves, so they are managed by operator tooling
//! rather than the scoped store.

use autohaul_core::OrganizationId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::db::RepositoryError;

const MIN_SLUG_LENGTH: usize = 3;
const MAX_SLUG_LENGTH: usize = 63;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    /// Globally unique, URL-safe handle.
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check a slug: 3-63 characters of lowercase letters, digits and hyphens,
/// not starting or ending with a hyphen.
///
/// # Errors
///
/// Returns `RepositoryError::Invalid` describing the first problem found.
pub fn validate_slug(slug: &str) -> Result<(), RepositoryError> {
    if !(MIN_SLUG_LENGTH..=MAX_SLUG_LENGTH).contains(&slug.len()) {
        return Err(RepositoryError::Invalid(format!(
            "slug must be {MIN_SLUG_LENGTH}-{MAX_SLUG_LENGTH} characters"
        )));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(RepositoryError::Invalid(
            "slug may only contain lowercase letters, digits and hyphens".to_owned(),
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(RepositoryError::Invalid(
            "slug cannot start or end with a hyphen".to_owned(),
        ));
    }
    Ok(())
}
