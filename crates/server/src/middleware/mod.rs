//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span, echoed in the response)
//!
//! Authentication is per-route through the [`RequireAdmin`] and
//! [`RequireCustomer`] extractors.

pub mod auth;
pub mod request_id;

pub use auth::{RequireAdmin, RequireCustomer};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
