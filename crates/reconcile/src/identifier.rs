//! Identifier normalization.
//!
//! References arrive as raw strings, extended-JSON object ids, or garbage. A
//! store filter is exact about shape, so [`candidates`] expands one reference
//! into every form worth querying, in the order they should be tried.

use serde_json::Value;

use carbridge_core::ObjectId;

/// Ordered query forms for a raw reference value.
///
/// - 24-hex string: `[string, {"$oid": hex}]`
/// - other non-empty string: `[string]`
/// - `{"$oid": valid-hex}`: `[{"$oid": hex}, hex-string]`
/// - anything else: `[]`
///
/// Strings are trimmed. An empty list means "no match", never an error.
#[must_use]
pub fn candidates(raw: &Value) -> Vec<Value> {
    match raw {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Vec::new();
            }
            match ObjectId::parse_str(s) {
                Ok(oid) => vec![Value::String(s.to_string()), oid.to_extended_json()],
                Err(_) => vec![Value::String(s.to_string())],
            }
        }
        Value::Object(_) => ObjectId::from_json(raw)
            .map(|oid| vec![raw.clone(), Value::String(oid.to_hex())])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Convenience for references held as text.
#[must_use]
pub fn candidates_for_str(raw: &str) -> Vec<Value> {
    candidates(&Value::String(raw.to_string()))
}

/// Canonical text form of a reference, used for log fields and record links.
///
/// Object ids render as lowercase hex; other strings are trimmed.
#[must_use]
pub fn canonical(raw: &Value) -> Option<String> {
    if let Some(oid) = ObjectId::from_json(raw) {
        return Some(oid.to_hex());
    }
    raw.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Whether two textual references name the same entity, comparing object ids
/// by value so case and surrounding whitespace do not matter.
#[must_use]
pub fn same_id(a: &str, b: &str) -> bool {
    match (
        canonical(&Value::String(a.to_string())),
        canonical(&Value::String(b.to_string())),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
