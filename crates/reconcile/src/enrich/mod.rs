//! Entity enrichment.
//!
//! Partial copies of customers and vehicles are embedded all over the store:
//! an inquiry carries `customerName`/`customerEmail`, a vehicle carries a
//! `customer` sub-object, a shipping record a `vehicleInfoSnapshot`. The
//! enrichers merge such a fragment with the authoritative record (when one
//! was resolved) into a single total view.
//!
//! For every canonical field the value comes from, in order:
//! 1. the authoritative record, under that field's authoritative aliases;
//! 2. the fragment, under its fragment aliases;
//! 3. [`Field::Unknown`].
//!
//! Empty and placeholder values are skipped at every step.

mod customer;
mod vehicle;

pub use customer::{Customer, enrich_customer};
pub use vehicle::{Vehicle, enrich_vehicle};

use serde_json::Value;

use crate::entity::{Field, FieldAliases, is_empty_value};
use crate::identifier;
use crate::store::Document;

/// Non-empty values for a field, highest priority first.
fn sources<'a>(
    aliases: &'a FieldAliases,
    fragment: &'a Document,
    authoritative: Option<&'a Document>,
) -> impl Iterator<Item = &'a Value> + 'a {
    let from_authoritative = authoritative
        .into_iter()
        .flat_map(move |doc| aliases.authoritative.iter().filter_map(move |a| doc.get(*a)));
    let from_fragment = aliases
        .fragment
        .iter()
        .filter_map(move |a| fragment.get(*a));
    from_authoritative
        .chain(from_fragment)
        .filter(|v| !is_empty_value(v))
}

/// First source value that `parse` accepts.
fn pick<T>(
    aliases: &FieldAliases,
    fragment: &Document,
    authoritative: Option<&Document>,
    parse: impl Fn(&Value) -> Option<T>,
) -> Field<T> {
    sources(aliases, fragment, authoritative)
        .find_map(parse)
        .into()
}

/// Render a stored scalar as text.
///
/// Object ids become hex and `{"$date": ...}` wrappers are unwrapped; other
/// objects and arrays have no text form.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => {
            if let Some(id) = identifier::canonical(value) {
                return Some(id);
            }
            map.get("$date").and_then(as_text)
        }
        Value::Array(_) | Value::Null => None,
    }
}

/// Fragment values may be nested one level under these keys.
const NESTED_FRAGMENT_KEYS: [&str; 2] = ["customer", "user"];

/// Flatten a nested customer sub-object into the fragment, without
/// overwriting top-level keys.
fn flatten_fragment(fragment: &Document) -> Document {
    let mut flat = fragment.clone();
    for key in NESTED_FRAGMENT_KEYS {
        if let Some(Value::Object(nested)) = fragment.get(key) {
            for (k, v) in nested {
                flat.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_text() {
        assert_eq!(as_text(&json!(" Kia ")), Some("Kia".to_string()));
        assert_eq!(as_text(&json!(2019)), Some("2019".to_string()));
        assert_eq!(
            as_text(&json!({ "$oid": "64f1c2a9e4b0a1b2c3d4e5a1" })),
            Some("64f1c2a9e4b0a1b2c3d4e5a1".to_string())
        );
        assert_eq!(
            as_text(&json!({ "$date": "2026-01-01T00:00:00Z" })),
            Some("2026-01-01T00:00:00Z".to_string())
        );
        assert_eq!(as_text(&json!([1])), None);
    }

    #[test]
    fn test_flatten_keeps_top_level() {
        let doc = json!({ "email": "top@x.com", "customer": { "email": "nested@x.com", "phone": "555" } });
        let flat = flatten_fragment(doc.as_object().unwrap_or(&Document::new()));
        assert_eq!(flat["email"], json!("top@x.com"));
        assert_eq!(flat["phone"], json!("555"));
    }
}
