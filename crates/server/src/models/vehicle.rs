//! Vehicles carried by a shipment.
//!
//! Vehicles have no organization column; they belong to whichever
//! organization owns their shipment.

use autohaul_core::{ShipmentId, VehicleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};

use super::{optional_text, require_text};
use crate::db::RepositoryError;
use crate::db::scoped::{
    EntityKind, EntityPatch, NewEntity, Ownership, Reference, TenantOwned, assign, filter_eq,
};
use crate::services::tenant::TenantIdentity;

const VIN_LENGTH: usize = 17;
const FIRST_MODEL_YEAR: i32 = 1886;
const LAST_MODEL_YEAR: i32 = 2100;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: VehicleId,
    pub shipment_id: ShipmentId,
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleFilter {
    pub shipment_id: Option<ShipmentId>,
}

impl TenantOwned for Vehicle {
    type Id = VehicleId;
    type Filter = VehicleFilter;

    const KIND: EntityKind = EntityKind::Vehicle;
    const TABLE: &'static str = "vehicles";
    const COLUMNS: &'static str =
        "id, shipment_id, vin, make, model, year, created_at, updated_at";
    const OWNERSHIP: Ownership = Ownership::Through {
        column: "shipment_id",
        parent_table: "shipments",
    };
    const SORTABLE: &'static [&'static str] = &["make", "model", "year", "created_at"];
    const DEFAULT_SORT: &'static str = "created_at";

    fn id(&self) -> VehicleId {
        self.id
    }

    fn push_filter(filter: &VehicleFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(shipment_id) = filter.shipment_id {
            filter_eq(qb, "shipment_id", shipment_id);
        }
    }
}

/// Uppercase a VIN and check its shape: 17 characters, letters and digits
/// only, never `I`, `O` or `Q`.
fn normalize_vin(vin: &str) -> Result<String, RepositoryError> {
    let vin = vin.trim().to_ascii_uppercase();
    let valid = vin.len() == VIN_LENGTH
        && vin
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() && !matches!(b, b'I' | b'O' | b'Q'));
    if valid {
        Ok(vin)
    } else {
        Err(RepositoryError::Invalid(format!(
            "vin must be {VIN_LENGTH} letters or digits, excluding I, O and Q"
        )))
    }
}

fn check_year(year: Option<i32>) -> Result<(), RepositoryError> {
    match year {
        Some(y) if !(FIRST_MODEL_YEAR..=LAST_MODEL_YEAR).contains(&y) => Err(
            RepositoryError::Invalid(format!(
                "year must be between {FIRST_MODEL_YEAR} and {LAST_MODEL_YEAR}"
            )),
        ),
        _ => Ok(()),
    }
}

/// Request body for adding a vehicle; the shipment comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleInput {
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
}

impl VehicleInput {
    #[must_use]
    pub fn for_shipment(self, shipment_id: ShipmentId) -> NewVehicle {
        NewVehicle {
            shipment_id,
            vin: self.vin,
            make: self.make,
            model: self.model,
            year: self.year,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub shipment_id: ShipmentId,
    pub vin: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
}

impl NewEntity for NewVehicle {
    type Entity = Vehicle;

    const COLUMNS: &'static str = "shipment_id, vin, make, model, year";

    fn validate(&self) -> Result<(), RepositoryError> {
        require_text("make", &self.make)?;
        require_text("model", &self.model)?;
        if let Some(vin) = &self.vin {
            normalize_vin(vin)?;
        }
        check_year(self.year)
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::new(EntityKind::Shipment, self.shipment_id)]
    }

    fn push_values<'args>(self, values: &mut Separated<'_, 'args, Postgres, &'static str>) {
        values
            .push_bind(self.shipment_id)
            .push_bind(self.vin.and_then(|v| normalize_vin(&v).ok()))
            .push_bind(self.make.trim().to_owned())
            .push_bind(self.model.trim().to_owned())
            .push_bind(self.year);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehiclePatch {
    /// Move the vehicle to another of the caller's shipments.
    pub shipment_id: Option<ShipmentId>,
    pub vin: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

impl EntityPatch for VehiclePatch {
    type Entity = Vehicle;

    fn is_empty(&self) -> bool {
        self.shipment_id.is_none()
            && self.vin.is_none()
            && self.make.is_none()
            && self.model.is_none()
            && self.year.is_none()
    }

    fn validate(
        &self,
        _current: &Vehicle,
        _actor: &TenantIdentity,
    ) -> Result<(), RepositoryError> {
        optional_text("make", self.make.as_deref())?;
        optional_text("model", self.model.as_deref())?;
        if let Some(vin) = &self.vin {
            normalize_vin(vin)?;
        }
        check_year(self.year)
    }

    fn references(&self) -> Vec<Reference> {
        self.shipment_id
            .map(|id| Reference::new(EntityKind::Shipment, id))
            .into_iter()
            .collect()
    }

    fn push_assignments<'args>(self, set: &mut Separated<'_, 'args, Postgres, &'static str>) {
        if let Some(shipment_id) = self.shipment_id {
            assign(set, "shipment_id", shipment_id);
        }
        if let Some(vin) = self.vin.and_then(|v| normalize_vin(&v).ok()) {
            assign(set, "vin", vin);
        }
        if let Some(make) = self.make {
            assign(set, "make", make.trim().to_owned());
        }
        if let Some(model) = self.model {
            assign(set, "model", model.trim().to_owned());
        }
        if let Some(year) = self.year {
            assign(set, "year", year);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_vin_is_uppercased() {
        assert_eq!(
            normalize_vin(" 1ftfw1e50mfa12345 ").unwrap(),
            "1FTFW1E50MFA12345"
        );
    }

    #[test]
    fn test_vin_rejects_bad_shapes() {
        assert!(normalize_vin("1FTFW1E50MFA1234").is_err()); // 16 chars
        assert!(normalize_vin("1FTFW1E50MFA123456").is_err()); // 18 chars
        assert!(normalize_vin("1FTFW1E50MFA1234O").is_err()); // letter O
        assert!(normalize_vin("1FTFW1E50MFA-2345").is_err());
    }

    #[test]
    fn test_year_bounds() {
        assert!(check_year(None).is_ok());
        assert!(check_year(Some(1886)).is_ok());
        assert!(check_year(Some(1885)).is_err());
        assert!(check_year(Some(2101)).is_err());
    }

    #[test]
    fn test_input_takes_shipment_from_path() {
        let input: VehicleInput = serde_json::from_str(
            r#"{"make":"Ford","model":"F-150","shipment_id":"6f1c2a7e-3d4b-4c5a-9e8f-0a1b2c3d4e5f"}"#,
        )
        .unwrap();
        let shipment = ShipmentId::generate();
        let new = input.for_shipment(shipment);
        assert_eq!(new.shipment_id, shipment);
        assert_eq!(
            new.references(),
            vec![Reference::new(EntityKind::Shipment, shipment)]
        );
    }
}
