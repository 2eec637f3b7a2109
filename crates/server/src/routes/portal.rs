//! Customer portal routes.

use axum::{
    Json,
    extract::{Path, State},
};

use carbridge_reconcile::identifier::same_id;
use carbridge_reconcile::{EntityReference, ShippingView};

use crate::error::{AppError, Result};
use crate::middleware::RequireCustomer;
use crate::state::AppState;

/// `GET /api/portal/vehicles/{id}/shipping`
///
/// Only the owning customer sees a vehicle. Anyone else gets the same 404 as
/// for a vehicle that does not exist.
pub async fn shipping(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(id): Path<String>,
) -> Result<Json<ShippingView>> {
    let not_found = || AppError::NotFound(format!("vehicle {id}"));

    let view = state
        .reconciler()
        .vehicle_shipping(&EntityReference::vehicle(id.clone()))
        .await?
        .ok_or_else(not_found)?;

    let owned = view
        .vehicle
        .customer_id
        .as_option()
        .is_some_and(|owner| same_id(owner, &customer.subject_id));
    if !owned {
        tracing::debug!(
            vehicle_id = %id,
            customer_id = %customer.subject_id,
            "Vehicle not owned by requesting customer"
        );
        return Err(not_found());
    }

    Ok(Json(view))
}
