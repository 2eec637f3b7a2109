//! Shipping projection repair.
//!
//! Run after a shipping update reported `projectionUpdated: false`. The
//! vehicle's timeline and `shipping.*` fields are regenerated from its
//! shipping records; the records themselves are not touched.

use carbridge_reconcile::EntityReference;
use carbridge_reconcile::store::postgres::close_shared_pool;

use super::{CommandError, print_json, reconciler};

/// Rebuild one vehicle's projection and print the outcome.
pub async fn rebuild(vehicle: &str, source: Option<&str>) -> Result<(), CommandError> {
    let reconciler = reconciler().await?;
    let mut reference = EntityReference::vehicle(vehicle);
    if let Some(source) = source {
        reference = reference.with_hint(source);
    }

    let result = reconciler.rebuild_projection(&reference).await;
    close_shared_pool().await;

    let outcome = result?;
    if outcome.records == 0 {
        tracing::warn!(vehicle_id = %outcome.vehicle_id, "No shipping records; projection left as is");
    }
    print_json(&outcome)
}
