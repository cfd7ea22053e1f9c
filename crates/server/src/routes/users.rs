//! User management within the caller's organization.
//!
//! Reads go through the generic handlers; writes go through the auth
//! service, which owns password hashing and the role rules.

use autohaul_core::UserId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::RequireTenant;
use crate::models::{User, UserPatch};
use crate::services::auth::RegisterUser;
use crate::services::tenant::TenantIdentity;
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Json(request): Json<RegisterUser>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.auth().register_user(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(id): Path<Uuid>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>> {
    let user = state
        .auth()
        .update_user(&identity, UserId::new(id), patch)
        .await?;
    Ok(Json(user))
}

pub async fn destroy(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.auth().delete_user(&identity, UserId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's identity and user record.
#[derive(Debug, Serialize)]
pub struct Me {
    #[serde(flatten)]
    pub identity: TenantIdentity,
    pub user: User,
}

pub async fn me(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
) -> Result<Json<Me>> {
    let user = state
        .store()
        .get::<User>(&identity, identity.user_id())
        .await?;
    Ok(Json(Me { identity, user }))
}
