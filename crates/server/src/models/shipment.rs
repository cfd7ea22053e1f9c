//! Shipments: moving vehicles for a customer, hauled by a carrier.
//!
//! A shipment links records of its own organization only; both links are
//! reported as [`Reference`]s so they are checked inside the write's
//! transaction. Status changes follow [`ShipmentStatus::can_transition_to`].

use autohaul_core::{CarrierId, CustomerId, OrganizationId, ShipmentId, ShipmentStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{check_length, optional_text, require_text};
use crate::db::RepositoryError;
use crate::db::scoped::{
    EntityKind, EntityPatch, NewEntity, Ownership, Reference, TenantOwned, assign, filter_eq,
};
use crate::services::tenant::TenantIdentity;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Shipment {
    pub id: ShipmentId,
    pub organization_id: OrganizationId,
    pub customer_id: CustomerId,
    pub carrier_id: Option<CarrierId>,
    pub status: ShipmentStatus,
    pub origin: String,
    pub destination: String,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentFilter {
    pub status: Option<ShipmentStatus>,
    pub customer_id: Option<CustomerId>,
    pub carrier_id: Option<CarrierId>,
}

impl TenantOwned for Shipment {
    type Id = ShipmentId;
    type Filter = ShipmentFilter;

    const KIND: EntityKind = EntityKind::Shipment;
    const TABLE: &'static str = "shipments";
    const COLUMNS: &'static str = "id, organization_id, customer_id, carrier_id, status, origin, \
                                   destination, pickup_date, delivery_date, price, notes, \
                                   created_at, updated_at";
    const OWNERSHIP: Ownership = Ownership::Column;
    const SORTABLE: &'static [&'static str] = &[
        "created_at",
        "updated_at",
        "status",
        "pickup_date",
        "delivery_date",
        "price",
    ];
    const DEFAULT_SORT: &'static str = "created_at";

    fn id(&self) -> ShipmentId {
        self.id
    }

    fn push_filter(filter: &ShipmentFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(status) = filter.status {
            filter_eq(qb, "status", status);
        }
        if let Some(customer_id) = filter.customer_id {
            filter_eq(qb, "customer_id", customer_id);
        }
        if let Some(carrier_id) = filter.carrier_id {
            filter_eq(qb, "carrier_id", carrier_id);
        }
    }
}

fn check_dates(
    pickup: Option<NaiveDate>,
    delivery: Option<NaiveDate>,
) -> Result<(), RepositoryError> {
    if let (Some(pickup), Some(delivery)) = (pickup, delivery)
        && delivery < pickup
    {
        return Err(RepositoryError::Invalid(
            "delivery_date cannot be before pickup_date".to_owned(),
        ));
    }
    Ok(())
}

fn check_price(price: Option<Decimal>) -> Result<(), RepositoryError> {
    if price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
        return Err(RepositoryError::Invalid("price cannot be negative".to_owned()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShipment {
    pub customer_id: CustomerId,
    pub carrier_id: Option<CarrierId>,
    pub origin: String,
    pub destination: String,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub notes: Option<String>,
}

impl NewShipment {
    /// A shipment booked with a carrier starts out assigned.
    #[must_use]
    pub const fn initial_status(&self) -> ShipmentStatus {
        if self.carrier_id.is_some() {
            ShipmentStatus::Assigned
        } else {
            ShipmentStatus::Pending
        }
    }
}

impl NewEntity for NewShipment {
    type Entity = Shipment;

    const COLUMNS: &'static str = "customer_id, carrier_id, status, origin, destination, \
                                   pickup_date, delivery_date, price, notes";

    fn validate(&self) -> Result<(), RepositoryError> {
        require_text("origin", &self.origin)?;
        require_text("destination", &self.destination)?;
        check_dates(self.pickup_date, self.delivery_date)?;
        check_price(self.price)?;
        check_length("notes", self.notes.as_deref().unwrap_or_default())
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::new(EntityKind::Customer, self.customer_id)];
        if let Some(carrier_id) = self.carrier_id {
            refs.push(Reference::new(EntityKind::Carrier, carrier_id));
        }
        refs
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        let status = self.initial_status();
        values
            .push_bind(self.customer_id)
            .push_bind(self.carrier_id)
            .push_bind(status)
            .push_bind(self.origin.trim().to_owned())
            .push_bind(self.destination.trim().to_owned())
            .push_bind(self.pickup_date)
            .push_bind(self.delivery_date)
            .push_bind(self.price)
            .push_bind(self.notes);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShipmentPatch {
    pub customer_id: Option<CustomerId>,
    pub carrier_id: Option<CarrierId>,
    pub status: Option<ShipmentStatus>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub price: Option<Decimal>,
    pub notes: Option<String>,
}

impl EntityPatch for ShipmentPatch {
    type Entity = Shipment;

    fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.carrier_id.is_none()
            && self.status.is_none()
            && self.origin.is_none()
            && self.destination.is_none()
            && self.pickup_date.is_none()
            && self.delivery_date.is_none()
            && self.price.is_none()
            && self.notes.is_none()
    }

    fn validate(
        &self,
        current: &Shipment,
        _actor: &TenantIdentity,
    ) -> Result<(), RepositoryError> {
        let next = self.status.unwrap_or(current.status);
        if !current.status.can_transition_to(next) {
            return Err(RepositoryError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }
        if next.requires_carrier() && self.carrier_id.or(current.carrier_id).is_none() {
            return Err(RepositoryError::Invalid(format!(
                "a carrier is required for a shipment that is {next}"
            )));
        }

        optional_text("origin", self.origin.as_deref())?;
        optional_text("destination", self.destination.as_deref())?;
        check_dates(
            self.pickup_date.or(current.pickup_date),
            self.delivery_date.or(current.delivery_date),
        )?;
        check_price(self.price)?;
        check_length("notes", self.notes.as_deref().unwrap_or_default())
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        if let Some(customer_id) = self.customer_id {
            refs.push(Reference::new(EntityKind::Customer, customer_id));
        }
        if let Some(carrier_id) = self.carrier_id {
            refs.push(Reference::new(EntityKind::Carrier, carrier_id));
        }
        refs
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>) {
        if let Some(customer_id) = self.customer_id {
            assign(set, "customer_id", customer_id);
        }
        if let Some(carrier_id) = self.carrier_id {
            assign(set, "carrier_id", carrier_id);
        }
        if let Some(status) = self.status {
            assign(set, "status", status);
        }
        if let Some(origin) = self.origin {
            assign(set, "origin", origin.trim().to_owned());
        }
        if let Some(destination) = self.destination {
            assign(set, "destination", destination.trim().to_owned());
        }
        if let Some(pickup_date) = self.pickup_date {
            assign(set, "pickup_date", pickup_date);
        }
        if let Some(delivery_date) = self.delivery_date {
            assign(set, "delivery_date", delivery_date);
        }
        if let Some(price) = self.price {
            assign(set, "price", price);
        }
        if let Some(notes) = self.notes {
            assign(set, "notes", notes);
        }
    }
}
