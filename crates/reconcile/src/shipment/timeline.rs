//! Vehicle timeline entries.
//!
//! A vehicle's `timeline` array mixes entries written by several features
//! (documents, payments, shipping). Only `type = "shipping"` entries are
//! managed here; everything else is carried through untouched and in order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` of the entries this module manages.
pub const SHIPPING_EVENT_TYPE: &str = "shipping";

/// One timeline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub title: String,
    pub date: String,
    pub description: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub completed: bool,
}

impl TimelineEvent {
    #[must_use]
    pub fn shipping(title: &str, date: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            date: date.to_string(),
            description: description.to_string(),
            event_type: SHIPPING_EVENT_TYPE.to_string(),
            completed: true,
        }
    }

    fn key_matches(&self, entry: &Value) -> bool {
        entry.get("type").and_then(Value::as_str) == Some(self.event_type.as_str())
            && entry.get("title").and_then(Value::as_str) == Some(self.title.as_str())
    }

    fn to_value(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "date": self.date,
            "description": self.description,
            "type": self.event_type,
            "completed": self.completed,
        })
    }
}

/// Merge `events` into `existing`, keyed by `(type, title)`.
///
/// A matching entry is replaced in place; an unmatched event is appended.
/// Later duplicates of a replaced key are dropped, so legacy timelines that
/// already hold duplicates converge to one entry per key.
#[must_use]
pub fn upsert(existing: &[Value], events: &[TimelineEvent]) -> Vec<Value> {
    let mut timeline: Vec<Value> = existing.to_vec();
    for event in events {
        let matches: Vec<usize> = timeline
            .iter()
            .enumerate()
            .filter(|(_, entry)| event.key_matches(entry))
            .map(|(i, _)| i)
            .collect();

        let Some((&first, duplicates)) = matches.split_first() else {
            timeline.push(event.to_value());
            continue;
        };

        if let Some(slot) = timeline.get_mut(first) {
            *slot = event.to_value();
        }
        for &i in duplicates.iter().rev() {
            timeline.remove(i);
        }
    }
    timeline
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_appends_new_title() {
        let existing = vec![json!({ "title": "Deposit Paid", "type": "payment", "completed": true })];
        let merged = upsert(
            &existing,
            &[TimelineEvent::shipping("Vehicle Shipped", "2026-03-01T00:00:00.000Z", "Left port")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], existing[0]);
        assert_eq!(merged[1]["title"], json!("Vehicle Shipped"));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let existing = vec![
            json!({ "title": "Vehicle Shipped", "type": "shipping", "date": "old" }),
            json!({ "title": "Customs Cleared", "type": "customs" }),
        ];
        let merged = upsert(
            &existing,
            &[TimelineEvent::shipping("Vehicle Shipped", "new", "Left port")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["date"], json!("new"));
        assert_eq!(merged[1], existing[1]);
    }

    #[test]
    fn test_same_title_other_type_is_untouched() {
        let existing = vec![json!({ "title": "Vehicle Shipped", "type": "note" })];
        let merged = upsert(&existing, &[TimelineEvent::shipping("Vehicle Shipped", "d", "x")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], existing[0]);
    }

    #[test]
    fn test_legacy_duplicates_collapse() {
        let existing = vec![
            json!({ "title": "Vehicle Shipped", "type": "shipping", "date": "a" }),
            json!({ "title": "Paid", "type": "payment" }),
            json!({ "title": "Vehicle Shipped", "type": "shipping", "date": "b" }),
        ];
        let merged = upsert(&existing, &[TimelineEvent::shipping("Vehicle Shipped", "c", "x")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["date"], json!("c"));
        assert_eq!(merged[1]["title"], json!("Paid"));
    }
}
