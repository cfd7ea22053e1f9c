//! Domain models.
//!
//! Each tenant-owned record comes with its insert payload, its patch type and
//! its list filter. None of the request-facing types has an organization
//! field: ownership always comes from the caller's identity, and a forged
//! `organization_id` in a JSON body is dropped during deserialization.

pub mod carrier;
pub mod customer;
pub mod organization;
pub mod session;
pub mod shipment;
pub mod user;
pub mod vehicle;

pub use carrier::{Carrier, CarrierFilter, CarrierPatch, NewCarrier};
pub use customer::{Customer, CustomerFilter, CustomerPatch, NewCustomer};
pub use organization::{Organization, validate_slug};
pub use shipment::{NewShipment, Shipment, ShipmentFilter, ShipmentPatch};
pub use user::{NewUser, User, UserFilter, UserPatch};
pub use vehicle::{NewVehicle, Vehicle, VehicleFilter, VehicleInput, VehiclePatch};

use autohaul_core::Email;

use crate::db::RepositoryError;

/// Upper bound for free-text columns.
const MAX_TEXT_LENGTH: usize = 2000;

/// Reject blank or oversized required text.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), RepositoryError> {
    if value.trim().is_empty() {
        return Err(RepositoryError::Invalid(format!("{field} cannot be empty")));
    }
    check_length(field, value)
}

/// Same as [`require_text`] for fields that are only checked when set.
pub(crate) fn optional_text(field: &str, value: Option<&str>) -> Result<(), RepositoryError> {
    value.map_or(Ok(()), |v| require_text(field, v))
}

pub(crate) fn check_length(field: &str, value: &str) -> Result<(), RepositoryError> {
    if value.chars().count() > MAX_TEXT_LENGTH {
        return Err(RepositoryError::Invalid(format!(
            "{field} must be at most {MAX_TEXT_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Contact emails are optional on customers and carriers but must parse
/// when present.
pub(crate) fn optional_email(field: &str, value: Option<&str>) -> Result<(), RepositoryError> {
    if let Some(value) = value {
        Email::parse(value)
            .map_err(|e| RepositoryError::Invalid(format!("{field}: {e}")))?;
    }
    Ok(())
}

/// Normalized form of an optional contact email. Call after
/// [`optional_email`] has accepted it.
pub(crate) fn normalize_email(value: Option<String>) -> Option<String> {
    value.map(|v| Email::parse(&v).map_or(v, |e| e.as_str().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text() {
        assert!(require_text("name", "Acme").is_ok());
        assert!(require_text("name", "   ").is_err());
        assert!(require_text("name", &"x".repeat(MAX_TEXT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_optional_email() {
        assert!(optional_email("email", None).is_ok());
        assert!(optional_email("email", Some("ops@acme.test")).is_ok());
        assert!(optional_email("email", Some("not-an-email")).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email(Some(" Ops@Acme.TEST ".to_owned())),
            Some("ops@acme.test".to_owned())
        );
        assert_eq!(normalize_email(None), None);
    }
}
