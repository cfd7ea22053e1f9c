//! Database access for the Autohaul server.
//!
//! # Tables
//!
//! Organization-owned (carry `organization_id`):
//!
//! - `users` - Members of an organization, with role and password hash
//! - `customers` - Who ships the vehicles
//! - `carriers` - Who hauls them
//! - `shipments` - Links a customer and optionally a carrier
//!
//! Scoped through a parent:
//!
//! - `vehicles` - Belong to a shipment
//!
//! Global:
//!
//! - `organizations` - The tenants themselves
//! - `auth_tokens` - Hashed login tokens
//! - `schema_migrations` - Migration bookkeeping
//!
//! Tenant-owned tables are only reachable through [`scoped::ScopedStore`],
//! which takes the caller's [`TenantIdentity`](crate::services::tenant::TenantIdentity)
//! on every call.
//!
//! # Migrations
//!
//! Scripts in `crates/server/migrations/` are embedded in the binary and
//! applied at startup (see [`migrations`]), or by hand with:
//! ```bash
//! cargo run -p autohaul-cli -- migrate up
//! ```

pub mod auth_tokens;
pub mod migrations;
pub mod organizations;
pub mod references;
pub mod scoped;
pub mod users;

use std::time::Duration;

use autohaul_core::ShipmentStatus;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Requested entity was not found in the caller's organization.
    #[error("not found")]
    NotFound,

    /// A write referenced a row that is not visible to the caller.
    #[error("referenced record does not exist")]
    CrossTenantReference,

    /// A shipment status change that the lifecycle forbids.
    #[error("cannot move shipment from {from} to {to}")]
    InvalidTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },

    /// The caller's role does not allow this change to this record.
    #[error("insufficient role for this record")]
    Forbidden,

    /// Input rejected before reaching the database.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Constraint violation (e.g., unique email, record still referenced).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The operation did not finish within its deadline and was rolled back.
    #[error("database operation timed out")]
    Timeout,
}

impl RepositoryError {
    /// Whether retrying the same operation later might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            Self::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                // serialization_failure, deadlock_detected, query_canceled
                Some("40001" | "40P01" | "57014")
            ),
            _ => false,
        }
    }

    /// Whether the operation was cut off by a deadline, either ours or the
    /// server's `statement_timeout`.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some("57014"),
            _ => false,
        }
    }
}

/// Map a failed INSERT/UPDATE to a repository error.
///
/// A foreign key violation on a tenant-owned write can only mean the
/// referenced row is missing from the caller's organization.
pub(crate) fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("23503") => return RepositoryError::CrossTenantReference,
            Some("23505") => {
                return RepositoryError::Conflict(format!(
                    "duplicate value violates {}",
                    db.constraint().unwrap_or("a unique constraint")
                ));
            }
            Some("23514") => {
                return RepositoryError::Invalid(format!(
                    "value violates {}",
                    db.constraint().unwrap_or("a check constraint")
                ));
            }
            Some("57014") => return RepositoryError::Timeout,
            _ => {}
        }
    }
    RepositoryError::Database(e)
}

/// Map a failed DELETE. A foreign key violation here means other records
/// still point at the row.
pub(crate) fn map_delete_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e
        && db.code().as_deref() == Some("23503")
    {
        return RepositoryError::Conflict("record is still referenced by other records".to_owned());
    }
    map_write_error(e)
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Pagination and ordering for list queries.
///
/// `limit` is clamped to `1..=100` and `offset` to `>= 0`, so any values
/// taken from a query string are safe to pass through. `sort` is checked
/// against the entity's whitelist when the query is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    limit: i64,
    offset: i64,
    sort: Option<String>,
    order: SortOrder,
}

impl Pagination {
    /// Build from optional caller-supplied values.
    #[must_use]
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
            sort: None,
            order: SortOrder::Asc,
        }
    }

    /// Order by `column` (must be sortable for the listed entity).
    #[must_use]
    pub fn sorted_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(column.into());
        self.order = order;
        self
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.limit
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    #[must_use]
    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of a list query.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matching rows across all pages.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Create a `PostgreSQL` connection pool.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(max_connections.min(2))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
