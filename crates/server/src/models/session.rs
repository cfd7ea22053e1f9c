//! Session-related types.
//!
//! Browser clients that log in get their bearer token stored server-side in
//! a tower-sessions session, so the cookie alone authenticates them. The
//! token is still resolved on every request.

/// Session keys for authentication data.
pub mod keys {
    /// Key for the raw login token.
    pub const AUTH_TOKEN: &str = "auth_token";
}
