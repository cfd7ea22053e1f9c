//! Users: members of an organization.
//!
//! Users are inserted by the auth service (which owns password hashing) but
//! are otherwise read, listed, updated and deleted through the scoped store
//! like every other tenant-owned record.

use autohaul_core::{Email, OrganizationId, UserId, UserRole};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::optional_text;
use crate::db::RepositoryError;
use crate::db::scoped::{
    EntityKind, EntityPatch, NewEntity, Ownership, TenantOwned, assign, filter_eq,
};
use crate::services::tenant::TenantIdentity;

#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub organization_id: OrganizationId,
    #[sqlx(try_from = "String")]
    pub email: Email,
    pub name: String,
    /// Argon2id PHC string. Never serialized.
    #[serde(skip)]
    #[sqlx(try_from = "String")]
    pub password_hash: SecretString,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl TenantOwned for User {
    type Id = UserId;
    type Filter = UserFilter;

    const KIND: EntityKind = EntityKind::User;
    const TABLE: &'static str = "users";
    const COLUMNS: &'static str = "id, organization_id, email, name, password_hash, role, \
                                   is_active, created_at, updated_at";
    const OWNERSHIP: Ownership = Ownership::Column;
    const SORTABLE: &'static [&'static str] = &["name", "email", "role", "created_at"];
    const DEFAULT_SORT: &'static str = "created_at";
    const ACTIVE_COLUMN: Option<&'static str> = Some("is_active");

    fn id(&self) -> UserId {
        self.id
    }

    fn check_delete(&self, actor: &TenantIdentity) -> Result<(), RepositoryError> {
        require_owner_for(self.role, actor)
    }

    fn push_filter(filter: &UserFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(role) = filter.role {
            filter_eq(qb, "role", role);
        }
        if let Some(is_active) = filter.is_active {
            filter_eq(qb, "is_active", is_active);
        }
    }
}

/// Insert payload built by the auth service once the password is hashed.
#[derive(Debug)]
pub struct NewUser {
    pub email: Email,
    pub name: String,
    pub password_hash: SecretString,
    pub role: UserRole,
}

impl NewEntity for NewUser {
    type Entity = User;

    const COLUMNS: &'static str = "email, name, password_hash, role";

    fn validate(&self) -> Result<(), RepositoryError> {
        super::require_text("name", &self.name)
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        values
            .push_bind(String::from(self.email))
            .push_bind(self.name.trim().to_owned())
            .push_bind(self.password_hash.expose_secret().to_owned())
            .push_bind(self.role);
    }
}

/// Changes an administrator may make to a user. Email and password are not
/// editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl EntityPatch for UserPatch {
    type Entity = User;

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.role.is_none() && self.is_active.is_none()
    }

    fn validate(&self, current: &User, actor: &TenantIdentity) -> Result<(), RepositoryError> {
        optional_text("name", self.name.as_deref())?;
        require_owner_for(current.role, actor)?;
        match self.role {
            Some(role) => require_owner_for(role, actor),
            None => Ok(()),
        }
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>) {
        if let Some(name) = self.name {
            assign(set, "name", name.trim().to_owned());
        }
        if let Some(role) = self.role {
            assign(set, "role", role);
        }
        if let Some(is_active) = self.is_active {
            assign(set, "is_active", is_active);
        }
    }
}

/// Only an owner may modify an owner or hand out the owner role.
fn require_owner_for(role: UserRole, actor: &TenantIdentity) -> Result<(), RepositoryError> {
    if role == UserRole::Owner && actor.role() != UserRole::Owner {
        tracing::warn!(
            user_id = %actor.user_id(),
            role = %actor.role(),
            "non-owner tried to modify an owner"
        );
        return Err(RepositoryError::Forbidden);
    }
    Ok(())
}
