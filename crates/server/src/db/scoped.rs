//! Tenant-scoped data access.
//!
//! Every read and write of an organization-owned table goes through this
//! module. Each statement is assembled from static per-entity metadata
//! ([`TenantOwned`]) and always carries the tenant predicate for the
//! caller's organization, so a row belonging to another organization is
//! indistinguishable from a row that does not exist.
//!
//! Writes that link records run reference validation
//! ([`validate_same_tenant`](super::references::validate_same_tenant))
//! inside the same transaction as the write.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use autohaul_core::OrganizationId;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{Encode, FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction, Type};
use uuid::Uuid;

use super::references::validate_same_tenant;
use super::{Page, Pagination, RepositoryError, map_delete_error, map_write_error};
use crate::services::tenant::TenantIdentity;

/// Kinds of tenant-owned records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Customer,
    Carrier,
    Shipment,
    Vehicle,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Customer => "customer",
            Self::Carrier => "carrier",
            Self::Shipment => "shipment",
            Self::Vehicle => "vehicle",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a table is tied to its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The table has its own `organization_id` column.
    Column,
    /// The table is owned through a parent row: `column` references
    /// `parent_table.id`, and the parent has `organization_id`.
    Through {
        column: &'static str,
        parent_table: &'static str,
    },
}

/// A link from a record being written to another tenant-owned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl Reference {
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Row lock taken by a scoped select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    None,
    /// Blocks concurrent updates and deletes of the row until commit.
    Share,
    /// Serializes read-modify-write of the row.
    Update,
}

impl RowLock {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Share => " FOR SHARE",
            Self::Update => " FOR UPDATE",
        }
    }
}

/// A record that belongs to exactly one organization.
pub trait TenantOwned: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {
    type Id: Copy
        + Send
        + Sync
        + Display
        + From<Uuid>
        + for<'q> Encode<'q, Postgres>
        + Type<Postgres>
        + 'static;

    /// Optional list filters.
    type Filter: Default + Send + Sync;

    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Column list selected and returned, in `FromRow` field order.
    const COLUMNS: &'static str;
    const OWNERSHIP: Ownership;
    /// Columns a caller may sort by.
    const SORTABLE: &'static [&'static str];
    const DEFAULT_SORT: &'static str;
    /// Boolean column that must be true for the record to be linked.
    const ACTIVE_COLUMN: Option<&'static str> = None;

    fn id(&self) -> Self::Id;

    /// Check that `actor` may delete this (locked) row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Forbidden` if the actor's role is too low.
    fn check_delete(&self, _actor: &TenantIdentity) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Append ` AND ...` clauses for the set filter fields.
    fn push_filter(filter: &Self::Filter, qb: &mut QueryBuilder<'_, Postgres>);
}

/// Insert payload for a tenant-owned record.
///
/// Implementors carry no organization field; for [`Ownership::Column`]
/// tables the organization is bound from the caller's identity.
pub trait NewEntity: Send {
    type Entity: TenantOwned;

    /// Columns written by [`push_values`](Self::push_values), in order.
    const COLUMNS: &'static str;

    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for malformed input.
    fn validate(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Records this insert links to; each must be visible to the caller.
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// Partial update of a tenant-owned record. Only set fields are written.
pub trait EntityPatch: Send {
    type Entity: TenantOwned;

    fn is_empty(&self) -> bool;

    /// Check the patch against the current (locked) row and the caller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid`,
    /// `RepositoryError::InvalidTransition` or `RepositoryError::Forbidden`.
    fn validate(
        &self,
        _current: &Self::Entity,
        _actor: &TenantIdentity,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// Push `column = $n` onto a SET list.
pub fn assign<'args, T>(set: &mut Separated<'_, 'args, Postgres, &'static str>, column: &str, value: T)
where
    T: 'args + Encode<'args, Postgres> + Type<Postgres>,
{
    set.push(format_args!("{column} = "));
    set.push_bind_unseparated(value);
}

/// Push ` AND column = $n` onto a WHERE clause.
pub fn filter_eq<'args, T>(qb: &mut QueryBuilder<'args, Postgres>, column: &str, value: T)
where
    T: 'args + Encode<'args, Postgres> + Type<Postgres>,
{
    qb.push(format_args!(" AND {column} = "));
    qb.push_bind(value);
}

/// Push ` AND column ILIKE '%term%'`, with LIKE metacharacters escaped.
pub fn filter_contains(qb: &mut QueryBuilder<'_, Postgres>, column: &str, term: &str) {
    let term = term.trim();
    if term.is_empty() {
        return;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    qb.push(format_args!(" AND {column} ILIKE "));
    qb.push_bind(format!("%{escaped}%"));
}

/// Append the predicate restricting a table to one organization.
pub fn push_tenant_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    ownership: Ownership,
    organization_id: OrganizationId,
) {
    match ownership {
        Ownership::Column => {
            qb.push("organization_id = ");
            qb.push_bind(organization_id);
        }
        Ownership::Through {
            column,
            parent_table,
        } => {
            qb.push(format_args!(
                "{column} IN (SELECT id FROM {parent_table} WHERE organization_id = "
            ));
            qb.push_bind(organization_id);
            qb.push(")");
        }
    }
}

fn push_scoped_where<E: TenantOwned>(
    qb: &mut QueryBuilder<'_, Postgres>,
    organization_id: OrganizationId,
    id: E::Id,
) {
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(" AND ");
    push_tenant_predicate(qb, E::OWNERSHIP, organization_id);
}

pub(crate) fn select_query<E: TenantOwned>(
    organization_id: OrganizationId,
    id: E::Id,
    lock: RowLock,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE));
    push_scoped_where::<E>(&mut qb, organization_id, id);
    qb.push(lock.as_sql());
    qb
}

/// Select the row's active flag (`TRUE` for entities without one), so no
/// row means not visible.
pub(crate) fn exists_query<E: TenantOwned>(
    organization_id: OrganizationId,
    id: E::Id,
    lock: RowLock,
) -> QueryBuilder<'static, Postgres> {
    let active = E::ACTIVE_COLUMN.unwrap_or("TRUE");
    let mut qb = QueryBuilder::new(format!("SELECT {active} FROM {}", E::TABLE));
    push_scoped_where::<E>(&mut qb, organization_id, id);
    qb.push(lock.as_sql());
    qb
}

fn push_list_where<E: TenantOwned>(
    qb: &mut QueryBuilder<'_, Postgres>,
    organization_id: OrganizationId,
    filter: &E::Filter,
) {
    qb.push(" WHERE ");
    push_tenant_predicate(qb, E::OWNERSHIP, organization_id);
    E::push_filter(filter, qb);
}

pub(crate) fn count_query<E: TenantOwned>(
    organization_id: OrganizationId,
    filter: &E::Filter,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_list_where::<E>(&mut qb, organization_id, filter);
    qb
}

pub(crate) fn list_query<E: TenantOwned>(
    organization_id: OrganizationId,
    filter: &E::Filter,
    pagination: &Pagination,
) -> Result<QueryBuilder<'static, Postgres>, RepositoryError> {
    let sort = match pagination.sort() {
        None => E::DEFAULT_SORT,
        Some(requested) => E::SORTABLE
            .iter()
            .copied()
            .find(|column| *column == requested)
            .ok_or_else(|| {
                RepositoryError::Invalid(format!(
                    "cannot sort {} by `{requested}`; expected one of: {}",
                    E::KIND,
                    E::SORTABLE.join(", ")
                ))
            })?,
    };
    let direction = pagination.order().as_sql();

    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", E::COLUMNS, E::TABLE));
    push_list_where::<E>(&mut qb, organization_id, filter);
    qb.push(format_args!(" ORDER BY {sort} {direction}, id {direction} LIMIT "));
    qb.push_bind(pagination.limit());
    qb.push(" OFFSET ");
    qb.push_bind(pagination.offset());
    Ok(qb)
}

pub(crate) fn insert_query<N: NewEntity>(
    organization_id: OrganizationId,
    new: N,
) -> QueryBuilder<'static, Postgres> {
    let owned_by_column = N::Entity::OWNERSHIP == Ownership::Column;
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", N::Entity::TABLE));
    if owned_by_column {
        qb.push("organization_id, ");
    }
    qb.push(N::COLUMNS);
    qb.push(") VALUES (");
    {
        let mut values = qb.separated(", ");
        if owned_by_column {
            values.push_bind(organization_id);
        }
        new.push_values(&mut values);
    }
    qb.push(format_args!(") RETURNING {}", N::Entity::COLUMNS));
    qb
}

pub(crate) fn update_query<P: EntityPatch>(
    organization_id: OrganizationId,
    id: <P::Entity as TenantOwned>::Id,
    patch: P,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", P::Entity::TABLE));
    {
        let mut set = qb.separated(", ");
        patch.push_assignments(&mut set);
        set.push("updated_at = NOW()");
    }
    push_scoped_where::<P::Entity>(&mut qb, organization_id, id);
    qb.push(format_args!(" RETURNING {}", P::Entity::COLUMNS));
    qb
}

pub(crate) fn delete_query<E: TenantOwned>(
    organization_id: OrganizationId,
    id: E::Id,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {}", E::TABLE));
    push_scoped_where::<E>(&mut qb, organization_id, id);
    qb
}

/// Load one row of `E` visible to `organization_id`.
///
/// # Errors
///
/// Returns `sqlx::Error` if the query fails.
pub async fn fetch_scoped<E: TenantOwned>(
    conn: &mut PgConnection,
    organization_id: OrganizationId,
    id: E::Id,
    lock: RowLock,
) -> Result<Option<E>, sqlx::Error> {
    select_query::<E>(organization_id, id, lock)
        .build_query_as::<E>()
        .fetch_optional(&mut *conn)
        .await
}

/// Insert a record for `organization_id` on an existing connection.
///
/// Does not validate references; callers inside this crate use it for
/// onboarding where the organization is created in the same transaction.
pub(crate) async fn insert_scoped<N: NewEntity>(
    conn: &mut PgConnection,
    organization_id: OrganizationId,
    new: N,
) -> Result<N::Entity, RepositoryError> {
    insert_query(organization_id, new)
        .build_query_as::<N::Entity>()
        .fetch_one(&mut *conn)
        .await
        .map_err(map_write_error)
}

/// Tenant-scoped CRUD over every [`TenantOwned`] record.
///
/// Every call takes the caller's identity and runs in its own transaction
/// bounded by a deadline; an operation that overruns is abandoned and its
/// transaction rolled back.
#[derive(Debug, Clone, Copy)]
pub struct ScopedStore<'a> {
    pool: &'a PgPool,
    timeout: Duration,
}

impl<'a> ScopedStore<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Same store with a different deadline.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            pool: self.pool,
            timeout,
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(statement_timeout_ms(self.timeout).to_string())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Run `op` under the deadline, then commit what it returns.
    ///
    /// Only the statements are bounded. A transaction whose statements
    /// finished is always committed, so a `Timeout` means nothing was
    /// written. Postgres cancelling a statement on `statement_timeout`
    /// is reported the same way as the local deadline.
    async fn bounded<T>(
        &self,
        kind: EntityKind,
        op: impl Future<Output = Result<(Transaction<'static, Postgres>, T), RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        let (tx, value) = match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) if !e.is_timeout() => return Err(e),
            _ => {
                tracing::warn!(
                    kind = %kind,
                    timeout_ms = self.timeout.as_millis(),
                    "database operation timed out"
                );
                return Err(RepositoryError::Timeout);
            }
        };
        tx.commit().await?;
        Ok(value)
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such record exists in the
    /// caller's organization.
    pub async fn get<E: TenantOwned>(
        &self,
        identity: &TenantIdentity,
        id: E::Id,
    ) -> Result<E, RepositoryError> {
        self.bounded(E::KIND, async {
            let mut tx = self.begin().await?;
            let entity = fetch_scoped::<E>(&mut tx, identity.organization_id(), id, RowLock::None)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            Ok((tx, entity))
        })
        .await
    }

    /// One page of the caller's records.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for a sort column outside the
    /// entity's whitelist.
    pub async fn list<E: TenantOwned>(
        &self,
        identity: &TenantIdentity,
        pagination: &Pagination,
    ) -> Result<Page<E>, RepositoryError> {
        self.list_filtered::<E>(identity, &E::Filter::default(), pagination)
            .await
    }

    /// One page of the caller's records matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for a sort column outside the
    /// entity's whitelist.
    pub async fn list_filtered<E: TenantOwned>(
        &self,
        identity: &TenantIdentity,
        filter: &E::Filter,
        pagination: &Pagination,
    ) -> Result<Page<E>, RepositoryError> {
        let organization_id = identity.organization_id();
        let mut items_query = list_query::<E>(organization_id, filter, pagination)?;
        let mut total_query = count_query::<E>(organization_id, filter);

        self.bounded(E::KIND, async {
            let mut tx = self.begin().await?;
            let total: i64 = total_query
                .build_query_scalar()
                .fetch_one(&mut *tx)
                .await?;
            let items = items_query
                .build_query_as::<E>()
                .fetch_all(&mut *tx)
                .await?;
            let page = Page {
                items,
                total,
                limit: pagination.limit(),
                offset: pagination.offset(),
            };
            Ok((tx, page))
        })
        .await
    }

    /// Insert a record owned by the caller's organization.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for malformed input or a link to
    /// an inactive record, `RepositoryError::CrossTenantReference` if a
    /// linked record is not visible to the caller, or
    /// `RepositoryError::Conflict` on a unique violation. Nothing is
    /// written on error.
    pub async fn create<N: NewEntity>(
        &self,
        identity: &TenantIdentity,
        new: N,
    ) -> Result<N::Entity, RepositoryError> {
        new.validate()?;
        let references = new.references();
        let organization_id = identity.organization_id();

        let entity = self
            .bounded(N::Entity::KIND, async move {
                let mut tx = self.begin().await?;
                for reference in references {
                    validate_same_tenant(&mut tx, identity, reference.kind, reference.id).await?;
                }
                let entity = insert_scoped(&mut tx, organization_id, new).await?;
                Ok((tx, entity))
            })
            .await?;

        tracing::info!(
            kind = %N::Entity::KIND,
            id = %entity.id(),
            organization_id = %organization_id,
            user_id = %identity.user_id(),
            "record created"
        );
        Ok(entity)
    }

    /// Apply a partial update to one of the caller's records.
    ///
    /// The current row is locked for the duration of the transaction, so
    /// validation sees the state the update applies to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record is not visible,
    /// `RepositoryError::InvalidTransition`, `RepositoryError::Invalid` or
    /// `RepositoryError::Forbidden` if the patch is rejected, or
    /// `RepositoryError::CrossTenantReference` for a foreign link.
    pub async fn update<P: EntityPatch>(
        &self,
        identity: &TenantIdentity,
        id: <P::Entity as TenantOwned>::Id,
        patch: P,
    ) -> Result<P::Entity, RepositoryError> {
        let organization_id = identity.organization_id();
        let changes = !patch.is_empty();

        let updated = self
            .bounded(P::Entity::KIND, async move {
                let mut tx = self.begin().await?;
                let current =
                    fetch_scoped::<P::Entity>(&mut tx, organization_id, id, RowLock::Update)
                        .await?
                        .ok_or(RepositoryError::NotFound)?;
                if !changes {
                    return Ok((tx, current));
                }

                patch.validate(&current, identity)?;
                for reference in patch.references() {
                    validate_same_tenant(&mut tx, identity, reference.kind, reference.id).await?;
                }

                let updated = update_query(organization_id, id, patch)
                    .build_query_as::<P::Entity>()
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_write_error)?;
                Ok((tx, updated))
            })
            .await?;

        if changes {
            tracing::info!(
                kind = %P::Entity::KIND,
                id = %id,
                organization_id = %organization_id,
                user_id = %identity.user_id(),
                "record updated"
            );
        }
        Ok(updated)
    }

    /// Delete one of the caller's records.
    ///
    /// The row is locked and passed to [`TenantOwned::check_delete`] before
    /// it is removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record is not visible,
    /// `RepositoryError::Forbidden` if the caller may not delete it, or
    /// `RepositoryError::Conflict` if other records still reference it.
    pub async fn delete<E: TenantOwned>(
        &self,
        identity: &TenantIdentity,
        id: E::Id,
    ) -> Result<(), RepositoryError> {
        let organization_id = identity.organization_id();

        self.bounded(E::KIND, async {
            let mut tx = self.begin().await?;
            let current = fetch_scoped::<E>(&mut tx, organization_id, id, RowLock::Update)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            current.check_delete(identity)?;

            let result = delete_query::<E>(organization_id, id)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_delete_error)?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok((tx, ()))
        })
        .await?;

        tracing::info!(
            kind = %E::KIND,
            id = %id,
            organization_id = %organization_id,
            user_id = %identity.user_id(),
            "record deleted"
        );
        Ok(())
    }
}

/// `statement_timeout` in whole milliseconds. Rounds up so a sub-millisecond
/// deadline never becomes `0`, which Postgres reads as no limit.
fn statement_timeout_ms(timeout: Duration) -> u128 {
    timeout.as_nanos().div_ceil(1_000_000).max(1)
}
