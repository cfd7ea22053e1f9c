//! Autohaul Core - Shared domain types.
//!
//! This crate provides the types shared by every Autohaul component:
//! - `server` - Multi-tenant logistics API
//! - `cli` - Command-line tools for migrations and tenant onboarding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP. The optional `postgres` feature adds `sqlx` encoding so the
//! same types can be bound directly into queries.
//!
//! # Modules
//!
//! - [`types`] - Typed UUID ids, emails, shipment statuses and user roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
