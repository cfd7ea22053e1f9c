//! Business logic services.
//!
//! # Services
//!
//! - `tenant` - Resolves login tokens to a [`tenant::TenantIdentity`]
//! - `auth` - Login, logout, user registration and tenant onboarding

pub mod auth;
pub mod tenant;
