//! Entity kinds and the alias tables that describe their schema drift.
//!
//! Each logical entity is stored under several collections and field names
//! depending on which generation of the platform wrote it. Everything the
//! resolver and enricher know about that drift lives in this module as data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collections holding vehicles, in resolution priority order.
pub const VEHICLE_COLLECTIONS: [&str; 3] = ["agreedvehicles", "vehicles", "CarListing"];

/// Collections holding customers, in resolution priority order.
pub const CUSTOMER_COLLECTIONS: [&str; 2] = ["customers", "users"];

/// Identifier fields tried for every collection.
pub const ID_FIELDS: [&str; 2] = ["_id", "id"];

/// Field used for the customer email fallback.
pub const EMAIL_FIELD: &str = "email";

pub const SHIPPING_RECORDS: &str = "shippingrecords";
pub const INQUIRIES: &str = "inquiries";

/// Stored strings that mean "no value".
pub const PLACEHOLDERS: [&str; 3] = ["unknown", "n/a", "-"];

/// A logical entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vehicle,
    Customer,
}

impl EntityKind {
    /// Backing collections in priority order.
    #[must_use]
    pub const fn collections(self) -> &'static [&'static str] {
        match self {
            Self::Vehicle => &VEHICLE_COLLECTIONS,
            Self::Customer => &CUSTOMER_COLLECTIONS,
        }
    }

    /// Whether this kind falls back to an email lookup.
    #[must_use]
    pub const fn has_email_fallback(self) -> bool {
        matches!(self, Self::Customer)
    }

    /// Whether `name` is one of this kind's collections.
    #[must_use]
    pub fn owns_collection(self, name: &str) -> bool {
        self.collections().contains(&name.trim())
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vehicle => write!(f, "vehicle"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

/// Where a canonical field's value may be found.
///
/// `authoritative` aliases are read from the record fetched from the entity's
/// own collection; `fragment` aliases from partial copies embedded in other
/// records (inquiries, vehicles, shipping snapshots).
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub canonical: &'static str,
    pub authoritative: &'static [&'static str],
    pub fragment: &'static [&'static str],
}

macro_rules! aliases {
    ($canonical:literal, [$($auth:literal),*], [$($frag:literal),*]) => {
        FieldAliases {
            canonical: $canonical,
            authoritative: &[$($auth),*],
            fragment: &[$($frag),*],
        }
    };
}

pub const CUSTOMER_FIELDS: &[FieldAliases] = &[
    aliases!("id", ["_id", "id"], ["customerId", "userId"]),
    aliases!("firstName", ["firstName", "first_name"], ["firstName", "customerFirstName", "first_name"]),
    aliases!("lastName", ["lastName", "last_name"], ["lastName", "customerLastName", "last_name"]),
    aliases!("email", ["email"], ["customerEmail", "email"]),
    aliases!("phone", ["phone", "phoneNumber"], ["customerPhone", "phone", "phoneNumber"]),
    aliases!("status", ["status"], []),
    aliases!("createdAt", ["createdAt", "created_at"], []),
];

/// Full-name aliases, split into first and last name when a part is missing.
pub const CUSTOMER_FULL_NAME_ALIASES: [&str; 3] = ["customerName", "name", "fullName"];

pub const VEHICLE_FIELDS: &[FieldAliases] = &[
    aliases!("id", ["_id", "id"], ["vehicleId", "carId", "_id", "id"]),
    aliases!("make", ["make", "brand"], ["make", "carMake", "brand"]),
    aliases!("model", ["model"], ["model", "carModel"]),
    aliases!("year", ["year"], ["year", "carYear"]),
    aliases!("price", ["price"], ["price", "carPrice"]),
    aliases!("agreedPrice", ["agreedPrice"], ["agreedPrice"]),
    aliases!("status", ["status"], []),
    aliases!("customerId", ["customerId", "userId"], ["customerId", "userId"]),
    aliases!("vin", ["vin", "VIN"], ["vin", "VIN"]),
];

/// Alias entry matching nothing.
pub const NO_ALIASES: FieldAliases = FieldAliases {
    canonical: "",
    authoritative: &[],
    fragment: &[],
};

/// Look up the alias entry for a canonical field.
#[must_use]
pub fn aliases_for(table: &'static [FieldAliases], canonical: &str) -> Option<&'static FieldAliases> {
    table.iter().find(|a| a.canonical == canonical)
}

/// A canonical field that is either known or explicitly unknown.
///
/// Serializes as the value itself or `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unknown
    }
}

impl<T> Field<T> {
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    #[must_use]
    pub const fn as_option(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// Map the inner value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Known(v) => Field::Known(f(v)),
            Self::Unknown => Field::Unknown,
        }
    }

    /// Keep `self` if known, otherwise try `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Known(_) => self,
            Self::Unknown => other,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

/// Whether a stored value carries information.
///
/// `null`, blank strings, placeholder strings, and empty arrays/objects are
/// all empty.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || PLACEHOLDERS.iter().any(|p| s.eq_ignore_ascii_case(p))
        }
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// First non-empty value under any of `aliases` in `doc`, in alias order.
#[must_use]
pub fn first_non_empty<'a>(
    doc: &'a serde_json::Map<String, Value>,
    aliases: &[&str],
) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| doc.get(*alias))
        .find(|v| !is_empty_value(v))
}
