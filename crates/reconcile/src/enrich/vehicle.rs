use serde::Serialize;
use serde_json::Value;

use carbridge_core::Price;

use super::{as_text, pick};
use crate::entity::{Field, FieldAliases, NO_ALIASES, VEHICLE_FIELDS, aliases_for};
use crate::shipment::timeline::TimelineEvent;
use crate::store::Document;

/// Merged view of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Field<String>,
    pub make: Field<String>,
    pub model: Field<String>,
    pub year: Field<i32>,
    pub price: Field<Price>,
    pub agreed_price: Field<Price>,
    pub status: Field<String>,
    pub customer_id: Field<String>,
    pub vin: Field<String>,
    /// Timeline of the authoritative record, in stored order. Empty without one.
    pub timeline: Vec<TimelineEvent>,
}

impl Vehicle {
    /// "2019 Toyota Land Cruiser", skipping unknown parts.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        let year = self.year.as_option().map(ToString::to_string);
        let parts: Vec<&str> = [
            year.as_deref(),
            self.make.as_option().map(String::as_str),
            self.model.as_option().map(String::as_str),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// Snapshot stored on shipping records and inquiries. The timeline is
    /// left out.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("timeline");
        }
        value
    }
}

fn field(canonical: &str) -> &'static FieldAliases {
    aliases_for(VEHICLE_FIELDS, canonical).unwrap_or(&NO_ALIASES)
}

/// Years arrive as numbers or as text such as `"2019"`.
fn as_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse one stored timeline entry. Entries without a title are skipped;
/// missing `date`, `description` and `completed` default to empty/false.
fn as_timeline_event(entry: &Value) -> Option<TimelineEvent> {
    let title = entry.get("title").and_then(as_text).filter(|t| !t.is_empty())?;
    let text = |key: &str| entry.get(key).and_then(as_text).unwrap_or_default();
    Some(TimelineEvent {
        title,
        date: text("date"),
        description: text("description"),
        event_type: text("type"),
        completed: entry
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn timeline(authoritative: Option<&Document>) -> Vec<TimelineEvent> {
    authoritative
        .and_then(|doc| doc.get("timeline"))
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(as_timeline_event).collect())
        .unwrap_or_default()
}

/// Merge a vehicle fragment with the authoritative record.
///
/// Same precedence as [`super::enrich_customer`]. Typed fields (`year`,
/// prices) skip values that do not parse and keep looking.
#[must_use]
pub fn enrich_vehicle(fragment: &Document, authoritative: Option<&Document>) -> Vehicle {
    let text = |name: &str| pick(field(name), fragment, authoritative, as_text);
    let price = |name: &str| pick(field(name), fragment, authoritative, Price::from_json);

    Vehicle {
        id: text("id"),
        make: text("make"),
        model: text("model"),
        year: pick(field("year"), fragment, authoritative, as_year),
        price: price("price"),
        agreed_price: price("agreedPrice"),
        status: text("status"),
        customer_id: text("customerId"),
        vin: text("vin").map(|v| v.to_uppercase()),
        timeline: timeline(authoritative),
    }
}
