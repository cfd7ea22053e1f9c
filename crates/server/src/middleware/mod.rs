//! HTTP middleware stack for the API server.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. Request ID (accept or generate `x-request-id`)
//! 3. `TraceLayer` (request span carrying the request id)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Rate limiting on login (governor)
//!
//! Tenant resolution happens per handler through the [`RequireTenant`]
//! extractor, which also records organization and user on the span.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{PresentedToken, RequireTenant, clear_auth_token, set_auth_token};
pub use rate_limit::login_rate_limiter;
pub use request_id::{make_request_span, request_id_middleware};
pub use session::create_session_layer;
