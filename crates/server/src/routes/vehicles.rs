//! Admin vehicle routes: lookup, shipping updates and projection repair.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use carbridge_core::{AdminRole, Role, ShippingStatus};
use carbridge_reconcile::{
    EntityReference, Found, RebuildOutcome, ShipmentOutcome, StatusUpdate, Vehicle,
};

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::routes::with_source;
use crate::state::AppState;

/// Optional collection hint, e.g. `?source=CarListing`.
#[derive(Debug, Default, Deserialize)]
pub struct SourceQuery {
    pub source: Option<String>,
}

impl SourceQuery {
    pub(crate) fn reference(&self, id: String) -> Result<EntityReference> {
        with_source(EntityReference::vehicle(id), self.source.as_deref())
    }
}

/// Body of a shipping update. The author is taken from the token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingUpdateRequest {
    pub status: ShippingStatus,
    pub method: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub description: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ShippingUpdateRequest {
    fn into_update(self, updated_by: &str) -> StatusUpdate {
        let mut update = StatusUpdate::new(self.status, updated_by);
        update.method = non_blank(self.method);
        update.tracking_number = non_blank(self.tracking_number);
        update.carrier = non_blank(self.carrier);
        update.description = non_blank(self.description);
        update
    }
}

/// `GET /api/admin/vehicles/{id}`
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<Found<Vehicle>>> {
    state
        .reconciler()
        .resolve_vehicle(&query.reference(id.clone())?)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(format!("vehicle {id}")))
}

/// `POST /api/admin/vehicles/{id}/shipping`
///
/// Responds 200 even when only the shipping record was stored; the body then
/// has `projectionUpdated: false` and a `warning`.
pub async fn update_shipping(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
    Json(body): Json<ShippingUpdateRequest>,
) -> Result<Json<ShipmentOutcome>> {
    let update = body.into_update(&admin.subject_id);
    let outcome = state
        .reconciler()
        .record_shipment_update(&query.reference(id)?, update)
        .await?;
    Ok(Json(outcome))
}

/// `POST /api/admin/vehicles/{id}/shipping/rebuild`
///
/// Operator repair after a partial reconciliation. Admins and super admins only.
pub async fn rebuild_shipping(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<RebuildOutcome>> {
    if !matches!(
        admin.role,
        Role::Admin(AdminRole::Admin | AdminRole::SuperAdmin)
    ) {
        return Err(AppError::Forbidden(format!(
            "{} may not rebuild projections",
            admin.subject_id
        )));
    }
    let outcome = state
        .reconciler()
        .rebuild_projection(&query.reference(id)?)
        .await?;
    Ok(Json(outcome))
}
