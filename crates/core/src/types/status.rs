//! Status and role enums shared by the server and CLI.

use serde::{Deserialize, Serialize};

/// Lifecycle of a shipment.
///
/// Progression is forward-only:
///
/// ```text
/// pending -> assigned -> in_transit -> delivered
///    \__________\____________\______-> cancelled
/// ```
///
/// `delivered` and `cancelled` are terminal. Once a shipment leaves
/// `pending` it can never return to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shipment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    /// Position along the forward progression. `Cancelled` sits outside it.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Assigned => Some(1),
            Self::InTransit => Some(2),
            Self::Delivered => Some(3),
            Self::Cancelled => None,
        }
    }

    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Staying in the same state is allowed (idempotent updates). Any
    /// non-terminal state may be cancelled; otherwise the status may only
    /// advance exactly one step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self as u8 == next as u8 {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }

    /// Whether a shipment in this state must have a carrier attached.
    #[must_use]
    pub const fn requires_carrier(self) -> bool {
        matches!(self, Self::Assigned | Self::InTransit | Self::Delivered)
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::InTransit => write!(f, "in_transit"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid shipment status: {s}")),
        }
    }
}

/// A user's role inside their organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Created at onboarding; full control over the organization.
    Owner,
    /// Can manage users and all logistics records.
    Admin,
    /// Can manage customers, carriers and shipments.
    Dispatcher,
    /// Read-only access.
    Viewer,
}

impl UserRole {
    /// Whether this role may add, modify or remove users.
    #[must_use]
    pub const fn can_manage_users(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    /// Whether this role may write logistics records.
    #[must_use]
    pub const fn can_write(self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Dispatcher => write!(f, "dispatcher"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "dispatcher" => Ok(Self::Dispatcher),
            "viewer" => Ok(Self::Viewer),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use ShipmentStatus::{Assigned, Cancelled, Delivered, InTransit, Pending};

    #[test]
    fn test_forward_progression() {
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Delivered));
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(!Pending.can_transition_to(InTransit));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Assigned.can_transition_to(Delivered));
    }

    #[test]
    fn test_never_back_to_pending() {
        for from in [Assigned, InTransit, Delivered, Cancelled] {
            assert!(!from.can_transition_to(Pending), "{from} -> pending");
        }
        assert!(!InTransit.can_transition_to(Assigned));
    }

    #[test]
    fn test_cancel_from_non_terminal_only() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(InTransit.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Assigned));
    }

    #[test]
    fn test_same_state_is_allowed() {
        for s in [Pending, Assigned, InTransit, Delivered, Cancelled] {
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn test_status_string_roundtrip() {
        for s in [Pending, Assigned, InTransit, Delivered, Cancelled] {
            assert_eq!(s.to_string().parse::<ShipmentStatus>().unwrap(), s);
        }
        assert!("lost".parse::<ShipmentStatus>().is_err());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&InTransit).unwrap();
        assert_eq!(json, "\"in_transit\"");
    }

    #[test]
    fn test_role_permissions() {
        assert!(UserRole::Owner.can_manage_users());
        assert!(UserRole::Admin.can_manage_users());
        assert!(!UserRole::Dispatcher.can_manage_users());
        assert!(UserRole::Dispatcher.can_write());
        assert!(!UserRole::Viewer.can_write());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("dispatcher".parse::<UserRole>().unwrap(), UserRole::Dispatcher);
        assert!("root".parse::<UserRole>().is_err());
    }
}
