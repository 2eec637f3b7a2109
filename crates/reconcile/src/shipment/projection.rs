//! Fold of the shipping record log into the vehicle's denormalized state.
//!
//! The log is append-only and authoritative. Re-deriving the projection from
//! the whole log on every write means a later writer never regresses state an
//! earlier writer produced, even without transactions.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use carbridge_core::ShippingStatus;

use super::timeline::TimelineEvent;
use crate::entity::is_empty_value;
use crate::store::{Document, id_string};

/// One shipping record as read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: Option<String>,
    pub status: ShippingStatus,
    pub created_at: String,
    pub method: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub description: Option<String>,
}

/// A stored record whose status is missing or not one of the known labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedRecord {
    pub id: Option<String>,
    pub created_at: String,
    pub status: Option<String>,
}

impl std::fmt::Display for UnrecognizedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shipping record {} ({}) has unrecognized status {}",
            self.id.as_deref().unwrap_or("?"),
            self.created_at,
            self.status.as_deref().unwrap_or("<missing>")
        )
    }
}

impl LogEntry {
    /// Parse a stored record.
    ///
    /// # Errors
    ///
    /// Returns the record's identity when its status is missing or
    /// unrecognized.
    pub fn from_document(doc: &Document) -> Result<Self, UnrecognizedRecord> {
        let raw_status = doc.get("status").and_then(Value::as_str);
        let id = id_string(doc);
        let created_at = text(doc, "createdAt").unwrap_or_default();
        let Some(status) = raw_status.and_then(ShippingStatus::parse_lenient) else {
            return Err(UnrecognizedRecord {
                id,
                created_at,
                status: raw_status.map(str::to_string),
            });
        };

        Ok(Self {
            id,
            status,
            created_at,
            method: text(doc, "method"),
            tracking_number: text(doc, "trackingNumber"),
            carrier: text(doc, "carrier"),
            description: text(doc, "description"),
        })
    }
}

/// A log read back from the store, oldest first.
pub type RawLog = Vec<Result<LogEntry, UnrecognizedRecord>>;

const fn created_at(record: &Result<LogEntry, UnrecognizedRecord>) -> &String {
    match record {
        Ok(entry) => &entry.created_at,
        Err(unrecognized) => &unrecognized.created_at,
    }
}

/// Sort a raw log by `createdAt`. Stable, so records sharing a timestamp keep
/// their read order.
pub fn sort_log(log: &mut [Result<LogEntry, UnrecognizedRecord>]) {
    log.sort_by(|a, b| created_at(a).cmp(created_at(b)));
}

/// The parsed entries of a sorted log.
///
/// Older unrecognized records are skipped with a warning.
///
/// # Errors
///
/// Returns the newest record when it is unrecognized, since the projected
/// status would otherwise point at an older record.
pub fn usable_entries(log: RawLog) -> Result<Vec<LogEntry>, UnrecognizedRecord> {
    if let Some(Err(newest)) = log.last() {
        return Err(newest.clone());
    }
    Ok(log
        .into_iter()
        .filter_map(|record| match record {
            Ok(entry) => Some(entry),
            Err(unrecognized) => {
                warn!(
                    record_id = unrecognized.id.as_deref().unwrap_or("?"),
                    status = unrecognized.status.as_deref().unwrap_or("<missing>"),
                    "Skipping older shipping record with unrecognized status"
                );
                None
            }
        })
        .collect())
}

fn text(doc: &Document, key: &str) -> Option<String> {
    let value = doc.get(key).filter(|v| !is_empty_value(v))?;
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("$date")
            .and_then(Value::as_str)
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}

/// Denormalized shipping state written to `vehicle.shipping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub status: ShippingStatus,
    pub last_updated: String,
    pub method: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

/// Result of folding a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folded {
    pub projection: Projection,
    /// One event per timeline title, in first-reached order.
    pub events: Vec<TimelineEvent>,
}

/// Fold a log sorted by `createdAt` ascending.
///
/// Status and `lastUpdated` come from the last entry. Method, tracking number
/// and carrier are the latest non-empty values, so a status-only update does
/// not erase them. Returns `None` for an empty log.
#[must_use]
pub fn fold(entries: &[LogEntry]) -> Option<Folded> {
    let last = entries.last()?;

    let latest = |pick: fn(&LogEntry) -> Option<&String>| {
        entries.iter().rev().find_map(pick).cloned()
    };

    let mut events: Vec<TimelineEvent> = Vec::new();
    for entry in entries {
        let Some(title) = entry.status.timeline_title() else {
            continue;
        };
        let event = TimelineEvent::shipping(
            title,
            &entry.created_at,
            &event_description(entry),
        );
        match events.iter_mut().find(|e| e.title == title) {
            Some(existing) => *existing = event,
            None => events.push(event),
        }
    }

    Some(Folded {
        projection: Projection {
            status: last.status,
            last_updated: last.created_at.clone(),
            method: latest(|e| e.method.as_ref()),
            tracking_number: latest(|e| e.tracking_number.as_ref()),
            carrier: latest(|e| e.carrier.as_ref()),
        },
        events,
    })
}

fn event_description(entry: &LogEntry) -> String {
    let base = entry
        .description
        .clone()
        .unwrap_or_else(|| entry.status.timeline_description().to_string());
    match (&entry.carrier, &entry.tracking_number) {
        (Some(carrier), Some(tracking)) => format!("{base} ({carrier}, tracking {tracking})"),
        (None, Some(tracking)) => format!("{base} (tracking {tracking})"),
        _ => base,
    }
}
