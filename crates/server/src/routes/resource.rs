//! Generic CRUD handlers for tenant-owned records.
//!
//! One set of handlers serves customers, carriers, shipments and vehicles;
//! each route instantiates them with the record, insert and patch types.
//! Every handler takes the caller's identity from [`RequireTenant`], so
//! nothing here can reach another organization's rows.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::db::scoped::{EntityPatch, NewEntity, TenantOwned};
use crate::db::{Page, Pagination, SortOrder};
use crate::error::Result;
use crate::middleware::RequireTenant;
use crate::services::auth::AuthError;
use crate::services::tenant::TenantIdentity;
use crate::state::AppState;

/// Paging and ordering query parameters shared by every list endpoint.
///
/// Filters are read from the same query string into the record's own
/// filter type.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
}

impl ListParams {
    #[must_use]
    pub fn pagination(self) -> Pagination {
        let pagination = Pagination::new(self.limit, self.offset);
        match self.sort {
            Some(sort) => pagination.sorted_by(sort, self.order.unwrap_or_default()),
            None => pagination,
        }
    }
}

/// Reject read-only callers before any write.
pub(crate) fn require_writer(identity: &TenantIdentity) -> Result<()> {
    if identity.role().can_write() {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %identity.user_id(),
            role = %identity.role(),
            "write denied for read-only role"
        );
        Err(AuthError::Forbidden.into())
    }
}

pub async fn list<E>(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Query(params): Query<ListParams>,
    Query(filter): Query<E::Filter>,
) -> Result<Json<Page<E>>>
where
    E: TenantOwned + Serialize,
    E::Filter: DeserializeOwned,
{
    let page = state
        .store()
        .list_filtered::<E>(&identity, &filter, &params.pagination())
        .await?;
    Ok(Json(page))
}

pub async fn show<E>(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(id): Path<Uuid>,
) -> Result<Json<E>>
where
    E: TenantOwned + Serialize,
{
    let entity = state.store().get::<E>(&identity, E::Id::from(id)).await?;
    Ok(Json(entity))
}

pub async fn create<N>(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Json(new): Json<N>,
) -> Result<(StatusCode, Json<N::Entity>)>
where
    N: NewEntity + DeserializeOwned,
    N::Entity: Serialize,
{
    require_writer(&identity)?;
    let entity = state.store().create(&identity, new).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn update<P>(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(id): Path<Uuid>,
    Json(patch): Json<P>,
) -> Result<Json<P::Entity>>
where
    P: EntityPatch + DeserializeOwned,
    P::Entity: Serialize,
{
    require_writer(&identity)?;
    let id = <P::Entity as TenantOwned>::Id::from(id);
    let entity = state.store().update(&identity, id, patch).await?;
    Ok(Json(entity))
}

pub async fn destroy<E>(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(id): Path<Uuid>,
) -> Result<StatusCode>
where
    E: TenantOwned,
{
    require_writer(&identity)?;
    state.store().delete::<E>(&identity, E::Id::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
