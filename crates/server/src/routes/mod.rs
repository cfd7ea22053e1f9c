//! HTTP route handlers for the API server.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database and schema)
//!
//! # Auth
//! POST /auth/login                      - Issue a token, store it in the session
//! POST /auth/logout                     - Revoke the presented token
//!
//! # API (requires a token)
//! GET  /api/me                          - Caller identity and user record
//! GET|POST         /api/customers
//! GET|PATCH|DELETE /api/customers/{id}
//! GET|POST         /api/carriers
//! GET|PATCH|DELETE /api/carriers/{id}
//! GET|POST         /api/shipments
//! GET|PATCH|DELETE /api/shipments/{id}
//! GET|POST         /api/shipments/{id}/vehicles
//! GET|PATCH|DELETE /api/vehicles/{id}
//! GET|POST         /api/users           - POST requires owner or admin
//! GET|PATCH|DELETE /api/users/{id}      - PATCH/DELETE require owner or admin
//! ```
//!
//! List endpoints take `limit`, `offset`, `sort` and `order` plus the
//! record's own filters in the query string.

pub mod auth;
pub mod health;
pub mod resource;
pub mod users;
pub mod vehicles;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::login_rate_limiter;
use crate::models::{
    Carrier, CarrierPatch, Customer, CustomerPatch, NewCarrier, NewCustomer, NewShipment,
    Shipment, ShipmentPatch, User, Vehicle, VehiclePatch,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login).layer(login_rate_limiter()))
        .route("/logout", post(auth::logout))
}

/// Create the tenant API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(users::me))
        // Customers
        .route(
            "/customers",
            get(resource::list::<Customer>).post(resource::create::<NewCustomer>),
        )
        .route(
            "/customers/{id}",
            get(resource::show::<Customer>)
                .patch(resource::update::<CustomerPatch>)
                .delete(resource::destroy::<Customer>),
        )
        // Carriers
        .route(
            "/carriers",
            get(resource::list::<Carrier>).post(resource::create::<NewCarrier>),
        )
        .route(
            "/carriers/{id}",
            get(resource::show::<Carrier>)
                .patch(resource::update::<CarrierPatch>)
                .delete(resource::destroy::<Carrier>),
        )
        // Shipments
        .route(
            "/shipments",
            get(resource::list::<Shipment>).post(resource::create::<NewShipment>),
        )
        .route(
            "/shipments/{id}",
            get(resource::show::<Shipment>)
                .patch(resource::update::<ShipmentPatch>)
                .delete(resource::destroy::<Shipment>),
        )
        // Vehicles
        .route(
            "/shipments/{id}/vehicles",
            get(vehicles::list).post(vehicles::create),
        )
        .route(
            "/vehicles/{id}",
            get(resource::show::<Vehicle>)
                .patch(resource::update::<VehiclePatch>)
                .delete(resource::destroy::<Vehicle>),
        )
        // Users
        .route("/users", get(resource::list::<User>).post(users::create))
        .route(
            "/users/{id}",
            get(resource::show::<User>)
                .patch(users::update)
                .delete(users::destroy),
        )
}

/// Create all routes for the server.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .nest("/api", api_routes())
}
