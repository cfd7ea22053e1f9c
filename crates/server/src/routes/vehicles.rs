//! Vehicles nested under their shipment.
//!
//! Vehicles have no organization column; they are reached through the
//! shipment, which must belong to the caller.

use autohaul_core::ShipmentId;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::resource::{ListParams, require_writer};
use crate::db::Page;
use crate::error::Result;
use crate::middleware::RequireTenant;
use crate::models::{Shipment, Vehicle, VehicleFilter, VehicleInput};
use crate::state::AppState;

/// List the vehicles on one shipment.
pub async fn list(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(shipment_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Vehicle>>> {
    let shipment_id = ShipmentId::new(shipment_id);
    let store = state.store();

    // Unknown and foreign shipments are both a 404, not an empty list
    store.get::<Shipment>(&identity, shipment_id).await?;

    let filter = VehicleFilter {
        shipment_id: Some(shipment_id),
    };
    let page = store
        .list_filtered::<Vehicle>(&identity, &filter, &params.pagination())
        .await?;
    Ok(Json(page))
}

/// Add a vehicle to a shipment.
pub async fn create(
    State(state): State<AppState>,
    RequireTenant(identity): RequireTenant,
    Path(shipment_id): Path<Uuid>,
    Json(input): Json<VehicleInput>,
) -> Result<(StatusCode, Json<Vehicle>)> {
    require_writer(&identity)?;
    let new = input.for_shipment(ShipmentId::new(shipment_id));
    let vehicle = state.store().create(&identity, new).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}
