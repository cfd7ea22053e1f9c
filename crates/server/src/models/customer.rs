//! Customers: the people and dealerships shipping vehicles.

use autohaul_core::{CustomerId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{check_length, normalize_email, optional_email, optional_text, require_text};
use crate::db::RepositoryError;
use crate::db::scoped::{
    EntityKind, EntityPatch, NewEntity, Ownership, TenantOwned, assign, filter_contains,
};
use crate::services::tenant::TenantIdentity;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `?q=` matches the customer name, case-insensitively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    pub q: Option<String>,
}

impl TenantOwned for Customer {
    type Id = CustomerId;
    type Filter = CustomerFilter;

    const KIND: EntityKind = EntityKind::Customer;
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static str =
        "id, organization_id, name, email, phone, address, notes, created_at, updated_at";
    const OWNERSHIP: Ownership = Ownership::Column;
    const SORTABLE: &'static [&'static str] = &["name", "created_at", "updated_at"];
    const DEFAULT_SORT: &'static str = "created_at";

    fn id(&self) -> CustomerId {
        self.id
    }

    fn push_filter(filter: &CustomerFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(q) = &filter.q {
            filter_contains(qb, "name", q);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl NewEntity for NewCustomer {
    type Entity = Customer;

    const COLUMNS: &'static str = "name, email, phone, address, notes";

    fn validate(&self) -> Result<(), RepositoryError> {
        require_text("name", &self.name)?;
        optional_email("email", self.email.as_deref())?;
        optional_text("phone", self.phone.as_deref())?;
        check_length("address", self.address.as_deref().unwrap_or_default())?;
        check_length("notes", self.notes.as_deref().unwrap_or_default())
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        values
            .push_bind(self.name.trim().to_owned())
            .push_bind(normalize_email(self.email))
            .push_bind(self.phone)
            .push_bind(self.address)
            .push_bind(self.notes);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl EntityPatch for CustomerPatch {
    type Entity = Customer;

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.notes.is_none()
    }

    fn validate(
        &self,
        _current: &Customer,
        _actor: &TenantIdentity,
    ) -> Result<(), RepositoryError> {
        optional_text("name", self.name.as_deref())?;
        optional_email("email", self.email.as_deref())?;
        optional_text("phone", self.phone.as_deref())?;
        check_length("address", self.address.as_deref().unwrap_or_default())?;
        check_length("notes", self.notes.as_deref().unwrap_or_default())
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>) {
        if let Some(name) = self.name {
            assign(set, "name", name.trim().to_owned());
        }
        if let Some(email) = normalize_email(self.email) {
            assign(set, "email", email);
        }
        if let Some(phone) = self.phone {
            assign(set, "phone", phone);
        }
        if let Some(address) = self.address {
            assign(set, "address", address);
        }
        if let Some(notes) = self.notes {
            assign(set, "notes", notes);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_forged_organization_is_ignored() {
        let json = r#"{"name":"Acme","organization_id":"6f1c2a7e-3d4b-4c5a-9e8f-0a1b2c3d4e5f"}"#;
        let new: NewCustomer = serde_json::from_str(json).unwrap();
        assert_eq!(new.name, "Acme");
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_rejects_blank_name_and_bad_email() {
        let mut new: NewCustomer = serde_json::from_str(r#"{"name":"  "}"#).unwrap();
        assert!(new.validate().is_err());
        new.name = "Acme".to_owned();
        new.email = Some("nope".to_owned());
        assert!(new.validate().is_err());
    }

    #[test]
    fn test_empty_patch() {
        assert!(CustomerPatch::default().is_empty());
        let patch: CustomerPatch =
            serde_json::from_str(r#"{"organization_id":"6f1c2a7e-3d4b-4c5a-9e8f-0a1b2c3d4e5f"}"#)
                .unwrap();
        assert!(patch.is_empty());
    }
}
