//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                   - Liveness
//! GET  /health/ready                             - Readiness (store ping)
//!
//! # Admin (admin token)
//! GET  /api/admin/vehicles/{id}?source=          - Resolved vehicle
//! POST /api/admin/vehicles/{id}/shipping         - Record a shipping update
//! POST /api/admin/vehicles/{id}/shipping/rebuild - Rebuild projection from the log
//! GET  /api/admin/customers/{id}?email=          - Resolved customer
//! POST /api/admin/inquiries/{id}/replies         - Reply to an inquiry
//!
//! # Portal (customer token)
//! GET  /api/portal/vehicles/{id}/shipping        - Shipping state of an owned vehicle
//! ```

pub mod customers;
pub mod health;
pub mod inquiries;
pub mod portal;
pub mod vehicles;

use axum::{
    Router,
    routing::{get, post},
};
use carbridge_reconcile::EntityReference;

use crate::error::{AppError, Result};

use crate::state::AppState;

/// Create the admin API router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/vehicles/{id}", get(vehicles::show))
        .route("/vehicles/{id}/shipping", post(vehicles::update_shipping))
        .route(
            "/vehicles/{id}/shipping/rebuild",
            post(vehicles::rebuild_shipping),
        )
        .route("/customers/{id}", get(customers::show))
        .route("/inquiries/{id}/replies", post(inquiries::reply))
}

/// Create the customer portal router.
pub fn portal_routes() -> Router<AppState> {
    Router::new().route("/vehicles/{id}/shipping", get(portal::shipping))
}

/// Create the full route tree.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/admin", admin_routes())
        .nest("/api/portal", portal_routes())
}

/// Attach a `?source=` hint, rejecting names that are not collections of the
/// reference's kind. Blank hints are ignored.
pub(crate) fn with_source(
    reference: EntityReference,
    source: Option<&str>,
) -> Result<EntityReference> {
    match source.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(reference),
        Some(hint) if reference.kind.owns_collection(hint) => Ok(reference.with_hint(hint)),
        Some(hint) => Err(AppError::BadRequest(format!(
            "unknown {} collection: {hint}",
            reference.kind
        ))),
    }
}
