//! Shipment status updates.
//!
//! Every update appends a shipping record to the log and then regenerates the
//! vehicle's `shipping` projection and `timeline` from the whole log. The log
//! write is the commit point: a failed projection write leaves the record in
//! place and is reported as a partial reconciliation that
//! [`ShipmentReconciler::rebuild_projection`] can repair later.

pub mod projection;
pub mod timeline;

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use carbridge_core::{ObjectId, ShippingStatus};

use self::projection::{LogEntry, RawLog, fold, sort_log, usable_entries};
use crate::entity::{ID_FIELDS, SHIPPING_RECORDS};
use crate::enrich::enrich_vehicle;
use crate::identifier;
use crate::resolver::{CollectionResolver, EntityReference, ResolveError, Resolved};
use crate::store::{
    Document, DocumentStore, Filter, Sort, StoreError, Update, get_path, id_string,
};

/// Fields written by a projection update.
const PROJECTION_FIELDS: [&str; 6] = [
    "timeline",
    "shipping.status",
    "shipping.lastUpdated",
    "shipping.method",
    "shipping.trackingNumber",
    "shipping.carrier",
];

/// A requested shipping status change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: ShippingStatus,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub tracking_number: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub carrier: Option<String>,
    pub updated_by: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub description: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(status: ShippingStatus, updated_by: impl Into<String>) -> Self {
        Self {
            status,
            method: None,
            tracking_number: None,
            carrier: None,
            updated_by: updated_by.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_tracking(mut self, carrier: impl Into<String>, number: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self.tracking_number = Some(number.into());
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// One row of the shipping log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShippingRecord {
    #[serde(rename = "_id")]
    id: Value,
    vehicle_id: String,
    vehicle_info_snapshot: Value,
    status: ShippingStatus,
    method: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    description: Option<String>,
    created_at: String,
    updated_by: String,
    source_collection: &'static str,
}

impl ShippingRecord {
    fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(doc)) => doc,
            _ => Document::new(),
        }
    }

    fn log_entry(&self) -> LogEntry {
        LogEntry {
            id: ObjectId::from_json(&self.id).map(|oid| oid.to_hex()),
            status: self.status,
            created_at: self.created_at.clone(),
            method: self.method.clone(),
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            description: self.description.clone(),
        }
    }
}

/// The record was stored but the vehicle projection was not updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialReconciliation {
    pub collection: String,
    pub vehicle_id: String,
    pub fields: Vec<String>,
    pub cause: String,
}

impl std::fmt::Display for PartialReconciliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projection of {}/{} not updated ({}): {}",
            self.collection,
            self.vehicle_id,
            self.fields.join(", "),
            self.cause
        )
    }
}

/// Result of [`ShipmentReconciler::record_update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentOutcome {
    pub shipping_record_id: String,
    pub projection_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<PartialReconciliation>,
    pub status: ShippingStatus,
    pub source_collection: String,
}

/// Result of [`ShipmentReconciler::rebuild_projection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildOutcome {
    pub vehicle_id: String,
    pub source_collection: String,
    pub records: usize,
    /// `None` when the log is empty and nothing was written.
    pub status: Option<ShippingStatus>,
}

#[derive(Debug, Error)]
pub enum ShipmentError {
    #[error("vehicle not found: {reference}")]
    VehicleNotFound { reference: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The vehicle a projection is written to.
struct Target {
    collection: &'static str,
    vehicle_id: String,
    filter: Filter,
}

impl Target {
    fn from_resolved(resolved: &Resolved) -> Option<Self> {
        // Update by whichever identifier field the record actually carries.
        let (field, raw) = ID_FIELDS
            .iter()
            .find_map(|f| resolved.record.get(*f).filter(|v| !v.is_null()).map(|v| (*f, v)))?;
        let vehicle_id = identifier::canonical(raw)?;
        Some(Self {
            collection: resolved.source_collection,
            vehicle_id,
            filter: Filter::eq(field, raw.clone()),
        })
    }

    fn warning(&self, cause: &impl std::fmt::Display) -> PartialReconciliation {
        PartialReconciliation {
            collection: self.collection.to_string(),
            vehicle_id: self.vehicle_id.clone(),
            fields: PROJECTION_FIELDS.iter().map(ToString::to_string).collect(),
            cause: cause.to_string(),
        }
    }
}

/// Records shipping updates and maintains the vehicle projection.
#[derive(Debug, Clone)]
pub struct ShipmentReconciler {
    store: Arc<dyn DocumentStore>,
    resolver: CollectionResolver,
}

impl ShipmentReconciler {
    #[must_use]
    pub const fn new(store: Arc<dyn DocumentStore>, resolver: CollectionResolver) -> Self {
        Self { store, resolver }
    }

    /// Append a shipping record and regenerate the vehicle projection.
    ///
    /// # Errors
    ///
    /// - `VehicleNotFound` if the reference does not resolve; nothing is written.
    /// - `Store` / `Resolve` if resolution or the record insert fails.
    ///
    /// A failure after the insert is not an error: the outcome carries
    /// `projection_updated = false` and a [`PartialReconciliation`].
    #[instrument(skip(self, reference, update), fields(status = %update.status))]
    pub async fn record_update(
        &self,
        reference: &EntityReference,
        update: StatusUpdate,
    ) -> Result<ShipmentOutcome, ShipmentError> {
        let resolved = self.resolve(reference).await?;
        let target = Target::from_resolved(&resolved).ok_or_else(|| {
            ShipmentError::Store(StoreError::DataCorruption {
                collection: resolved.source_collection.to_string(),
                detail: "resolved vehicle has no usable identifier".to_string(),
            })
        })?;

        if let Some(current) = get_path(&resolved.record, "shipping.status")
            .and_then(Value::as_str)
            .and_then(ShippingStatus::parse_lenient)
            && current.is_regression_to(update.status)
        {
            warn!(
                vehicle_id = %target.vehicle_id,
                from = %current,
                to = %update.status,
                "Shipping status regression"
            );
        }

        let record = ShippingRecord {
            id: ObjectId::new().to_extended_json(),
            vehicle_id: target.vehicle_id.clone(),
            vehicle_info_snapshot: enrich_vehicle(&Document::new(), Some(&resolved.record))
                .snapshot(),
            status: update.status,
            method: update.method,
            tracking_number: update.tracking_number,
            carrier: update.carrier,
            description: update.description,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            updated_by: update.updated_by,
            source_collection: target.collection,
        };
        let inserted = self
            .store
            .insert_one(SHIPPING_RECORDS, record.to_document())
            .await?;
        let shipping_record_id = identifier::canonical(&inserted).unwrap_or_default();

        info!(
            vehicle_id = %target.vehicle_id,
            collection = target.collection,
            record_id = %shipping_record_id,
            "Shipping record stored"
        );

        let (projection_updated, warning) =
            match self.project(&target, Some(record.log_entry())).await {
                Ok(_) => (true, None),
                Err(e) => {
                    let warning = target.warning(&e);
                    warn!(
                        collection = %warning.collection,
                        vehicle_id = %warning.vehicle_id,
                        fields = ?warning.fields,
                        cause = %warning.cause,
                        "Partial reconciliation: shipping record stored, projection not updated"
                    );
                    (false, Some(warning))
                }
            };

        Ok(ShipmentOutcome {
            shipping_record_id,
            projection_updated,
            warning,
            status: record.status,
            source_collection: target.collection.to_string(),
        })
    }

    /// Regenerate a vehicle's projection from its log without appending.
    ///
    /// # Errors
    ///
    /// Returns `VehicleNotFound` for an unresolvable reference and `Store`
    /// for any failure while reading the log or writing the projection.
    #[instrument(skip(self, reference))]
    pub async fn rebuild_projection(
        &self,
        reference: &EntityReference,
    ) -> Result<RebuildOutcome, ShipmentError> {
        let resolved = self.resolve(reference).await?;
        let target = Target::from_resolved(&resolved).ok_or_else(|| {
            ShipmentError::Store(StoreError::DataCorruption {
                collection: resolved.source_collection.to_string(),
                detail: "resolved vehicle has no usable identifier".to_string(),
            })
        })?;

        let (records, status) = self.project(&target, None).await?;
        info!(
            vehicle_id = %target.vehicle_id,
            collection = target.collection,
            records,
            "Shipping projection rebuilt"
        );

        Ok(RebuildOutcome {
            vehicle_id: target.vehicle_id,
            source_collection: target.collection.to_string(),
            records,
            status,
        })
    }

    async fn resolve(&self, reference: &EntityReference) -> Result<Resolved, ShipmentError> {
        self.resolver
            .resolve(reference)
            .await?
            .into_option()
            .ok_or_else(|| ShipmentError::VehicleNotFound {
                reference: identifier::canonical(&reference.raw)
                    .unwrap_or_else(|| reference.raw.to_string()),
            })
    }

    /// Read the log, fold it and write the projection.
    ///
    /// Returns the number of log entries folded and the resulting status.
    async fn project(
        &self,
        target: &Target,
        just_inserted: Option<LogEntry>,
    ) -> Result<(usize, Option<ShippingStatus>), StoreError> {
        let mut log = self.read_log(&target.vehicle_id).await?;

        if let Some(entry) = just_inserted
            && !log
                .iter()
                .any(|r| matches!(r, Ok(e) if e.id.is_some() && e.id == entry.id))
        {
            log.push(Ok(entry));
            sort_log(&mut log);
        }

        let entries = usable_entries(log).map_err(|newest| StoreError::DataCorruption {
            collection: SHIPPING_RECORDS.to_string(),
            detail: newest.to_string(),
        })?;

        let Some(folded) = fold(&entries) else {
            return Ok((0, None));
        };

        let vehicle = self
            .store
            .find_one(target.collection, &target.filter)
            .await?
            .ok_or_else(|| StoreError::DataCorruption {
                collection: target.collection.to_string(),
                detail: format!("vehicle {} disappeared before projection", target.vehicle_id),
            })?;

        let current: &[Value] = match vehicle.get("timeline") {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(StoreError::DataCorruption {
                    collection: target.collection.to_string(),
                    detail: format!("vehicle {} has a non-array timeline", target.vehicle_id),
                });
            }
        };

        let merged = timeline::upsert(current, &folded.events);
        let p = &folded.projection;
        let mut update = Update::new()
            .set("timeline", Value::Array(merged))
            .set("shipping.status", p.status.label())
            .set("shipping.lastUpdated", p.last_updated.clone());
        if let Some(method) = &p.method {
            update = update.set("shipping.method", method.clone());
        }
        if let Some(tracking) = &p.tracking_number {
            update = update.set("shipping.trackingNumber", tracking.clone());
        }
        if let Some(carrier) = &p.carrier {
            update = update.set("shipping.carrier", carrier.clone());
        }

        let result = self
            .store
            .update_one(target.collection, &target.filter, &update)
            .await?;
        if result.matched == 0 {
            return Err(StoreError::DataCorruption {
                collection: target.collection.to_string(),
                detail: format!("vehicle {} disappeared during projection", target.vehicle_id),
            });
        }

        Ok((entries.len(), Some(p.status)))
    }

    /// The vehicle's log in `createdAt` order, across every stored form of
    /// its id, with duplicates removed.
    async fn read_log(&self, vehicle_id: &str) -> Result<RawLog, StoreError> {
        let sort = Sort::ascending("createdAt");
        let mut seen: Vec<String> = Vec::new();
        let mut log: RawLog = Vec::new();

        for candidate in identifier::candidates_for_str(vehicle_id) {
            let docs = self
                .store
                .find(SHIPPING_RECORDS, &Filter::eq("vehicleId", candidate), Some(&sort))
                .await?;
            for doc in docs {
                if let Some(id) = id_string(&doc) {
                    if seen.contains(&id) {
                        continue;
                    }
                    seen.push(id);
                }
                log.push(LogEntry::from_document(&doc));
            }
        }

        sort_log(&mut log);
        Ok(log)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    const HEX: &str = "64f1c2a9e4b0a1b2c3d4e5a1";

    async fn setup(collection: &str, vehicle: Value) -> (Arc<MemoryStore>, ShipmentReconciler) {
        let store = Arc::new(MemoryStore::new());
        store.seed(collection, [vehicle]).await;
        let resolver = CollectionResolver::new(store.clone(), false);
        let reconciler = ShipmentReconciler::new(store.clone(), resolver);
        (store, reconciler)
    }

    fn shipped() -> StatusUpdate {
        StatusUpdate::new(ShippingStatus::Shipped, "admin-1").with_tracking("MSC", "MSCU1234567")
    }

    #[tokio::test]
    async fn test_shipped_twice_leaves_one_timeline_entry() {
        let (store, reconciler) = setup(
            "vehicles",
            json!({ "_id": { "$oid": HEX }, "make": "Toyota", "timeline": [
                { "title": "Deposit Paid", "type": "payment", "completed": true }
            ] }),
        )
        .await;
        let reference = EntityReference::vehicle(HEX);

        let first = reconciler.record_update(&reference, shipped()).await.unwrap();
        let second = reconciler.record_update(&reference, shipped()).await.unwrap();

        assert!(first.projection_updated && second.projection_updated);
        assert_ne!(first.shipping_record_id, second.shipping_record_id);
        assert_eq!(store.count(SHIPPING_RECORDS).await, 2);

        let vehicle = store.documents("vehicles").await.remove(0);
        let timeline = vehicle["timeline"].as_array().unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0]["title"], json!("Deposit Paid"));
        assert_eq!(timeline[1]["title"], json!("Vehicle Shipped"));
        assert_eq!(vehicle["shipping"]["status"], json!("Shipped"));
        assert_eq!(vehicle["shipping"]["trackingNumber"], json!("MSCU1234567"));
    }

    #[tokio::test]
    async fn test_record_carries_snapshot_and_source() {
        let (store, reconciler) =
            setup("CarListing", json!({ "id": "listing-7", "carMake": "Nissan", "make": "Nissan", "year": 1999 })).await;
        let outcome = reconciler
            .record_update(&EntityReference::vehicle("listing-7"), shipped())
            .await
            .unwrap();
        assert_eq!(outcome.source_collection, "CarListing");

        // Records link to the vehicle's `_id`, which the store assigned.
        let vehicle = store.documents("CarListing").await.remove(0);
        let record = store.documents(SHIPPING_RECORDS).await.remove(0);
        assert_eq!(record["vehicleId"], json!(id_string(&vehicle).unwrap()));
        assert_eq!(record["sourceCollection"], json!("CarListing"));
        assert_eq!(record["vehicleInfoSnapshot"]["make"], json!("Nissan"));
        assert_eq!(record["updatedBy"], json!("admin-1"));
    }

    #[tokio::test]
    async fn test_status_only_update_keeps_tracking() {
        let (store, reconciler) = setup("vehicles", json!({ "_id": HEX })).await;
        let reference = EntityReference::vehicle(HEX);
        reconciler.record_update(&reference, shipped()).await.unwrap();
        reconciler
            .record_update(&reference, StatusUpdate::new(ShippingStatus::Delivered, "admin-1"))
            .await
            .unwrap();

        let vehicle = store.documents("vehicles").await.remove(0);
        assert_eq!(vehicle["shipping"]["status"], json!("Delivered"));
        assert_eq!(vehicle["shipping"]["carrier"], json!("MSC"));
        let titles: Vec<_> = vehicle["timeline"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Vehicle Shipped", "Vehicle Delivered"]);
    }

    #[tokio::test]
    async fn test_projection_failure_is_partial_not_error() {
        let (store, reconciler) = setup("vehicles", json!({ "_id": HEX, "shipping": "legacy" })).await;
        let outcome = reconciler
            .record_update(&EntityReference::vehicle(HEX), shipped())
            .await
            .unwrap();

        assert!(!outcome.projection_updated);
        let warning = outcome.warning.unwrap();
        assert_eq!(warning.collection, "vehicles");
        assert_eq!(warning.vehicle_id, HEX);
        assert!(warning.fields.contains(&"shipping.status".to_string()));
        assert_eq!(store.count(SHIPPING_RECORDS).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_vehicle_writes_nothing() {
        let (store, reconciler) = setup("vehicles", json!({ "_id": "other" })).await;
        let err = reconciler
            .record_update(&EntityReference::vehicle(HEX), shipped())
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::VehicleNotFound { .. }));
        assert_eq!(store.count(SHIPPING_RECORDS).await, 0);
    }

    #[tokio::test]
    async fn test_rebuild_repairs_projection() {
        let (store, reconciler) = setup("vehicles", json!({ "_id": HEX })).await;
        store
            .seed(SHIPPING_RECORDS, [
                json!({ "_id": "r2", "vehicleId": { "$oid": HEX }, "status": "In transit", "createdAt": "2026-02-01T00:00:00.000Z" }),
                json!({ "_id": "r1", "vehicleId": HEX, "status": "Shipped", "createdAt": "2026-01-01T00:00:00.000Z" }),
            ])
            .await;

        let outcome = reconciler
            .rebuild_projection(&EntityReference::vehicle(HEX))
            .await
            .unwrap();
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.status, Some(ShippingStatus::InTransit));

        let vehicle = store.documents("vehicles").await.remove(0);
        assert_eq!(vehicle["shipping"]["status"], json!("In transit"));
        assert_eq!(vehicle["timeline"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_status_update_blank_fields() {
        let update: StatusUpdate = serde_json::from_value(json!({
            "status": "in_transit",
            "trackingNumber": "  ",
            "carrier": "MSC",
            "updatedBy": "admin-1"
        }))
        .unwrap();
        assert_eq!(update.status, ShippingStatus::InTransit);
        assert_eq!(update.tracking_number, None);
        assert_eq!(update.carrier.as_deref(), Some("MSC"));
    }
}
