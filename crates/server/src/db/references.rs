//! Cross-reference validation.
//!
//! A write that links one record to another (a shipment to its customer or
//! carrier, a vehicle to its shipment) must only link records of the
//! caller's own organization, and never a record that has been switched
//! off (an inactive carrier or user). The check runs inside the write's
//! transaction and takes a share lock on the referenced row, so the row can
//! be neither deleted nor deactivated between the check and the commit.

use sqlx::PgConnection;
use uuid::Uuid;

use super::RepositoryError;
use super::scoped::{EntityKind, RowLock, TenantOwned, exists_query};
use crate::models::{Carrier, Customer, Shipment, User, Vehicle};
use crate::services::tenant::TenantIdentity;

/// Ensure `id` names an active record of `kind` visible to `identity`.
///
/// A record that does not exist and a record owned by another organization
/// are reported identically.
///
/// # Errors
///
/// Returns `RepositoryError::CrossTenantReference` if the record is not
/// visible, `RepositoryError::Invalid` if it is inactive, or
/// `RepositoryError::Database` if the lookup fails.
pub async fn validate_same_tenant(
    conn: &mut PgConnection,
    identity: &TenantIdentity,
    kind: EntityKind,
    id: Uuid,
) -> Result<(), RepositoryError> {
    let active = match kind {
        EntityKind::User => lock_active::<User>(conn, identity, id).await?,
        EntityKind::Customer => lock_active::<Customer>(conn, identity, id).await?,
        EntityKind::Carrier => lock_active::<Carrier>(conn, identity, id).await?,
        EntityKind::Shipment => lock_active::<Shipment>(conn, identity, id).await?,
        EntityKind::Vehicle => lock_active::<Vehicle>(conn, identity, id).await?,
    };

    match active {
        Some(true) => Ok(()),
        Some(false) => Err(RepositoryError::Invalid(format!("{kind} {id} is inactive"))),
        None => {
            tracing::warn!(
                kind = %kind,
                referenced_id = %id,
                organization_id = %identity.organization_id(),
                user_id = %identity.user_id(),
                "rejected reference to a record outside the caller's organization"
            );
            Err(RepositoryError::CrossTenantReference)
        }
    }
}

/// Share-lock the row and read its active flag; `None` if not visible.
async fn lock_active<E: TenantOwned>(
    conn: &mut PgConnection,
    identity: &TenantIdentity,
    id: Uuid,
) -> Result<Option<bool>, sqlx::Error> {
    exists_query::<E>(identity.organization_id(), E::Id::from(id), RowLock::Share)
        .build_query_scalar::<bool>()
        .fetch_optional(&mut *conn)
        .await
}
