//! Autohaul server library.
//!
//! Multi-tenant logistics API: every organization sees only its own
//! customers, carriers, shipments, vehicles and users. Exposed as a library
//! so the CLI and the integration tests drive the same code as the binary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
