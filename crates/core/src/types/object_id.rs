//! Structured document identifiers.
//!
//! Documents in the store are keyed by a 12-byte object identifier. In JSON it
//! appears either as a bare 24-character hex string (legacy references copied
//! between records) or in extended form as `{"$oid": "<hex>"}` (the `_id` of
//! records written by the newer services). Both shapes are accepted when
//! deserializing; the extended form is always produced when serializing.

use core::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Key used by extended JSON to mark an object identifier.
pub const OID_KEY: &str = "$oid";

/// Errors that can occur when parsing an [`ObjectId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectIdError {
    /// The input has the wrong number of characters.
    #[error("object id must be {expected} hex characters (got {actual})")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },
    /// The input contains non-hex characters.
    #[error("object id contains non-hex characters")]
    InvalidHex,
}

/// A 12-byte document identifier.
///
/// Layout: 4-byte big-endian seconds since the epoch, 5 bytes unique to the
/// process, 3-byte big-endian counter.
///
/// ```
/// use carbridge_core::ObjectId;
///
/// let id = ObjectId::parse_str("64f1c2a9e4b0a1b2c3d4e5a1").unwrap();
/// assert_eq!(id.to_hex(), "64f1c2a9e4b0a1b2c3d4e5a1");
///
/// assert!(ObjectId::parse_str("64f...a1").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: AtomicU32 = AtomicU32::new(0);

impl ObjectId {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 24;

    /// Generate a new identifier for the current instant.
    #[must_use]
    pub fn new() -> Self {
        let seconds = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
        let unique = PROCESS_UNIQUE.get_or_init(rand::random::<[u8; 5]>);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Create an identifier from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse an identifier from its 24-character hex form.
    ///
    /// Surrounding whitespace is not accepted; callers trim first.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 24 hex characters.
    pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
        if s.len() != Self::HEX_LEN {
            return Err(ObjectIdError::InvalidLength {
                expected: Self::HEX_LEN,
                actual: s.len(),
            });
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ObjectIdError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Returns true if `s` would parse as an identifier.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Lowercase hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// The creation time embedded in the identifier.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let [a, b, c, d, ..] = self.0;
        DateTime::from_timestamp(i64::from(u32::from_be_bytes([a, b, c, d])), 0)
    }

    /// Extended JSON form, `{"$oid": "<hex>"}`.
    #[must_use]
    pub fn to_extended_json(&self) -> serde_json::Value {
        serde_json::json!({ OID_KEY: self.to_hex() })
    }

    /// Read an identifier from either JSON shape.
    ///
    /// Returns `None` for anything that is not a valid identifier.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::parse_str(s.trim()).ok(),
            serde_json::Value::Object(map) if map.len() == 1 => map
                .get(OID_KEY)
                .and_then(serde_json::Value::as_str)
                .and_then(|s| Self::parse_str(s.trim()).ok()),
            _ => None,
        }
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(OID_KEY, &self.to_hex())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ObjectIdVisitor;

        impl<'de> Visitor<'de> for ObjectIdVisitor {
            type Value = ObjectId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 24-character hex string or {\"$oid\": <hex>}")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ObjectId, E> {
                ObjectId::parse_str(v).map_err(E::custom)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ObjectId, A::Error> {
                let mut found = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == OID_KEY {
                        let hex: String = map.next_value()?;
                        found = Some(ObjectId::parse_str(&hex).map_err(de::Error::custom)?);
                    } else {
                        map.next_value::<de::IgnoredAny>()?;
                    }
                }
                found.ok_or_else(|| de::Error::missing_field(OID_KEY))
            }
        }

        deserializer.deserialize_any(ObjectIdVisitor)
    }
}

// SQLx support (with postgres feature): stored as TEXT hex.
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ObjectId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ObjectId {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse_str(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ObjectId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.to_hex(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const HEX: &str = "64f1c2a9e4b0a1b2c3d4e5a1";

    #[test]
    fn test_parse_valid() {
        let id = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(id.to_hex(), HEX);
        assert_eq!(id.to_string(), HEX);
    }

    #[test]
    fn test_parse_uppercase_normalizes() {
        let id = ObjectId::parse_str(&HEX.to_uppercase()).unwrap();
        assert_eq!(id.to_hex(), HEX);
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            ObjectId::parse_str("64f...a1"),
            Err(ObjectIdError::InvalidLength {
                expected: 24,
                actual: 8
            })
        );
        assert!(ObjectId::parse_str("").is_err());
    }

    #[test]
    fn test_parse_non_hex() {
        assert_eq!(
            ObjectId::parse_str("zzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(ObjectIdError::InvalidHex)
        );
    }

    #[test]
    fn test_is_valid_agrees_with_parse() {
        for s in [HEX, "abc", "zzzzzzzzzzzzzzzzzzzzzzzz", "", "64f1c2a9e4b0a1b2c3d4e5a1ff"] {
            assert_eq!(ObjectId::is_valid(s), ObjectId::parse_str(s).is_ok(), "{s}");
        }
    }

    #[test]
    fn test_new_ids_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(a.timestamp().is_some());
    }

    #[test]
    fn test_serializes_as_extended_json() {
        let id = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(serde_json::to_value(id).unwrap(), json!({ "$oid": HEX }));
    }

    #[test]
    fn test_deserializes_both_shapes() {
        let from_ext: ObjectId = serde_json::from_value(json!({ "$oid": HEX })).unwrap();
        let from_str: ObjectId = serde_json::from_value(json!(HEX)).unwrap();
        assert_eq!(from_ext, from_str);
        assert!(serde_json::from_value::<ObjectId>(json!({ "$oid": "nope" })).is_err());
    }

    #[test]
    fn test_from_json() {
        assert!(ObjectId::from_json(&json!(HEX)).is_some());
        assert!(ObjectId::from_json(&json!({ "$oid": HEX })).is_some());
        assert!(ObjectId::from_json(&json!({ "$oid": HEX, "extra": 1 })).is_none());
        assert!(ObjectId::from_json(&json!(42)).is_none());
        assert!(ObjectId::from_json(&serde_json::Value::Null).is_none());
    }
}
