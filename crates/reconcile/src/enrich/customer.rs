use serde::Serialize;
use serde_json::Value;

use carbridge_core::{CustomerStatus, Email};

use super::{as_text, flatten_fragment, pick};
use crate::entity::{
    CUSTOMER_FIELDS, CUSTOMER_FULL_NAME_ALIASES, Field, FieldAliases, NO_ALIASES, aliases_for,
    first_non_empty,
};
use crate::store::Document;

/// Merged view of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Field<String>,
    pub first_name: Field<String>,
    pub last_name: Field<String>,
    pub full_name: Field<String>,
    /// Always lowercase.
    pub email: Field<String>,
    pub phone: Field<String>,
    pub status: Field<String>,
    pub created_at: Field<String>,
}

impl Customer {
    /// Status parsed into the known set, if it is one of them.
    #[must_use]
    pub fn parsed_status(&self) -> Option<CustomerStatus> {
        self.status.as_option().and_then(|s| CustomerStatus::parse_lenient(s))
    }

    /// Best display name: full name, then email.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_option()
            .or_else(|| self.email.as_option())
            .map(String::as_str)
    }
}

fn field(canonical: &str) -> &'static FieldAliases {
    aliases_for(CUSTOMER_FIELDS, canonical).unwrap_or(&NO_ALIASES)
}

fn lowercase_email(value: &Value) -> Option<String> {
    let text = as_text(value)?;
    // Malformed addresses are kept, lowercased, rather than dropped.
    Some(Email::parse(&text).map_or_else(|_| text.to_lowercase(), Email::into_inner))
}

/// A full name split at the first whitespace run.
struct NameParts {
    full: String,
    first: Option<String>,
    last: Option<String>,
}

impl NameParts {
    fn from_doc(doc: &Document) -> Option<Self> {
        let full = first_non_empty(doc, &CUSTOMER_FULL_NAME_ALIASES).and_then(as_text)?;
        let mut split = full.splitn(2, char::is_whitespace);
        let first = split.next().map(str::to_string).filter(|s| !s.is_empty());
        let last = split
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Some(Self { full, first, last })
    }
}

fn join_known(first: &Field<String>, last: &Field<String>) -> Option<String> {
    let parts: Vec<&str> = [first.as_option(), last.as_option()]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Merge a customer fragment with the authoritative record.
///
/// Total: every field is either a value found in one of the inputs or
/// `Unknown`, and it is `Unknown` only if no input held a usable value.
///
/// Name parts follow the same precedence as every other field, with a full
/// name standing in for its parts: authoritative parts, then the split
/// authoritative full name, then fragment parts, then the split fragment
/// full name.
#[must_use]
pub fn enrich_customer(fragment: &Document, authoritative: Option<&Document>) -> Customer {
    let fragment = flatten_fragment(fragment);
    let empty = Document::new();
    let text = |name: &str| pick(field(name), &fragment, authoritative, as_text);
    let authoritative_text = |name: &str| pick(field(name), &empty, authoritative, as_text);
    let fragment_text = |name: &str| pick(field(name), &fragment, None, as_text);

    let authoritative_name = authoritative.and_then(NameParts::from_doc);
    let fragment_name = NameParts::from_doc(&fragment);

    let part = |name: &str, split: fn(&NameParts) -> Option<String>| {
        authoritative_text(name)
            .or(authoritative_name.as_ref().and_then(split).into())
            .or(fragment_text(name))
            .or(fragment_name.as_ref().and_then(split).into())
    };
    let first_name = part("firstName", |n| n.first.clone());
    let last_name = part("lastName", |n| n.last.clone());

    let authoritative_parts_known =
        authoritative_text("firstName").is_known() || authoritative_text("lastName").is_known();
    let full_name: Field<String> = authoritative_name
        .map(|n| n.full)
        .or_else(|| {
            authoritative_parts_known
                .then(|| join_known(&first_name, &last_name))
                .flatten()
        })
        .or_else(|| fragment_name.map(|n| n.full))
        .or_else(|| join_known(&first_name, &last_name))
        .into();

    Customer {
        id: text("id"),
        first_name,
        last_name,
        full_name,
        email: pick(field("email"), &fragment, authoritative, lowercase_email),
        phone: text("phone"),
        status: text("status"),
        created_at: text("createdAt"),
    }
}
