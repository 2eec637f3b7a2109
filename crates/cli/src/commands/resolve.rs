//! Entity lookups for support work.
//!
//! Prints the merged view and the collection it came from, exactly as the
//! admin API would return it.

use carbridge_reconcile::EntityReference;

use super::{CommandError, print_json, reconciler};

/// Resolve a vehicle and print it.
pub async fn vehicle(id: &str, source: Option<&str>) -> Result<(), CommandError> {
    let reconciler = reconciler().await?;
    let mut reference = EntityReference::vehicle(id);
    if let Some(source) = source {
        reference = reference.with_hint(source);
    }

    let found = reconciler
        .resolve_vehicle(&reference)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("vehicle {id}")))?;
    print_json(&found)
}

/// Resolve a customer and print it.
pub async fn customer(id: &str, email: Option<&str>) -> Result<(), CommandError> {
    let reconciler = reconciler().await?;
    let mut reference = EntityReference::customer(id);
    if let Some(email) = email {
        reference = reference.with_email(email);
    }

    let found = reconciler
        .resolve_customer(&reference)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("customer {id}")))?;
    print_json(&found)
}
