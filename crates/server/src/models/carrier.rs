//! Carriers: the trucking companies hauling shipments.

use autohaul_core::{CarrierId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{normalize_email, optional_email, optional_text, require_text};
use crate::db::RepositoryError;
use crate::db::scoped::{
    EntityKind, EntityPatch, NewEntity, Ownership, TenantOwned, assign, filter_contains,
    filter_eq,
};
use crate::services::tenant::TenantIdentity;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Carrier {
    pub id: CarrierId,
    pub organization_id: OrganizationId,
    pub name: String,
    /// FMCSA motor carrier number.
    pub mc_number: Option<String>,
    /// USDOT number.
    pub dot_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarrierFilter {
    pub q: Option<String>,
    pub is_active: Option<bool>,
}

impl TenantOwned for Carrier {
    type Id = CarrierId;
    type Filter = CarrierFilter;

    const KIND: EntityKind = EntityKind::Carrier;
    const TABLE: &'static str = "carriers";
    const COLUMNS: &'static str = "id, organization_id, name, mc_number, dot_number, phone, email, \
                                   is_active, created_at, updated_at";
    const OWNERSHIP: Ownership = Ownership::Column;
    const SORTABLE: &'static [&'static str] = &["name", "created_at", "updated_at"];
    const DEFAULT_SORT: &'static str = "created_at";
    const ACTIVE_COLUMN: Option<&'static str> = Some("is_active");

    fn id(&self) -> CarrierId {
        self.id
    }

    fn push_filter(filter: &CarrierFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(q) = &filter.q {
            filter_contains(qb, "name", q);
        }
        if let Some(is_active) = filter.is_active {
            filter_eq(qb, "is_active", is_active);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCarrier {
    pub name: String,
    pub mc_number: Option<String>,
    pub dot_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// MC and DOT numbers are digits only; a leading `MC`/`DOT` prefix is
/// tolerated on input and stripped.
fn normalize_registration(prefix: &str, value: &str) -> String {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    upper
        .strip_prefix(prefix)
        .map_or(trimmed, |rest| rest.trim_start_matches(['-', ' ', '#']))
        .to_owned()
}

fn check_registration(field: &str, prefix: &str, value: Option<&str>) -> Result<(), RepositoryError> {
    let Some(value) = value else {
        return Ok(());
    };
    let digits = normalize_registration(prefix, value);
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RepositoryError::Invalid(format!(
            "{field} must be 1-8 digits"
        )));
    }
    Ok(())
}

impl NewEntity for NewCarrier {
    type Entity = Carrier;

    const COLUMNS: &'static str = "name, mc_number, dot_number, phone, email";

    fn validate(&self) -> Result<(), RepositoryError> {
        require_text("name", &self.name)?;
        check_registration("mc_number", "MC", self.mc_number.as_deref())?;
        check_registration("dot_number", "DOT", self.dot_number.as_deref())?;
        optional_text("phone", self.phone.as_deref())?;
        optional_email("email", self.email.as_deref())
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        values
            .push_bind(self.name.trim().to_owned())
            .push_bind(self.mc_number.map(|v| normalize_registration("MC", &v)))
            .push_bind(self.dot_number.map(|v| normalize_registration("DOT", &v)))
            .push_bind(self.phone)
            .push_bind(normalize_email(self.email));
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarrierPatch {
    pub name: Option<String>,
    pub mc_number: Option<String>,
    pub dot_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl EntityPatch for CarrierPatch {
    type Entity = Carrier;

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.mc_number.is_none()
            && self.dot_number.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.is_active.is_none()
    }

    fn validate(
        &self,
        _current: &Carrier,
        _actor: &TenantIdentity,
    ) -> Result<(), RepositoryError> {
        optional_text("name", self.name.as_deref())?;
        check_registration("mc_number", "MC", self.mc_number.as_deref())?;
        check_registration("dot_number", "DOT", self.dot_number.as_deref())?;
        optional_text("phone", self.phone.as_deref())?;
        optional_email("email", self.email.as_deref())
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>) {
        if let Some(name) = self.name {
            assign(set, "name", name.trim().to_owned());
        }
        if let Some(mc) = self.mc_number {
            assign(set, "mc_number", normalize_registration("MC", &mc));
        }
        if let Some(dot) = self.dot_number {
            assign(set, "dot_number", normalize_registration("DOT", &dot));
        }
        if let Some(phone) = self.phone {
            assign(set, "phone", phone);
        }
        if let Some(email) = normalize_email(self.email) {
            assign(set, "email", email);
        }
        if let Some(is_active) = self.is_active {
            assign(set, "is_active", is_active);
        }
    }
}
