//! Document store abstraction.
//!
//! The platform's records live in a schemaless document store with no
//! referential integrity. This module defines the four operations the
//! reconciliation layer relies on (`find_one`, `find`, `update_one`,
//! `insert_one`) plus the small filter/update language they take.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-process store for tests and local development
//! - [`PgDocumentStore`] - JSONB documents table in `PostgreSQL`
//! - [`GuardedStore`] - wraps any backend with per-call timeouts and bounded retry
//!
//! # Consistency
//!
//! Every operation touches a single document (or reads a set of them). There
//! are no multi-document transactions: callers that write to two collections
//! must cope with the second write failing after the first succeeded.

pub mod guarded;
pub mod memory;
pub mod postgres;

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use carbridge_core::ObjectId;

pub use guarded::{GuardedStore, RetryPolicy};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// A stored document. Always a JSON object.
pub type Document = Map<String, Value>;

/// Name of the primary key field.
pub const ID_FIELD: &str = "_id";

/// Store operation, used to label errors and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    FindOne,
    Find,
    UpdateOne,
    InsertOne,
    Ping,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FindOne => write!(f, "findOne"),
            Self::Find => write!(f, "find"),
            Self::UpdateOne => write!(f, "updateOne"),
            Self::InsertOne => write!(f, "insertOne"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The call did not complete within its time budget.
    #[error("{operation} on {collection} timed out after {timeout:?}")]
    Timeout {
        operation: StoreOp,
        collection: String,
        timeout: Duration,
    },

    /// The backend could not be reached (pool exhausted, socket error).
    #[error("{operation} on {collection} failed: store unavailable: {message}")]
    Unavailable {
        operation: StoreOp,
        collection: String,
        message: String,
    },

    /// The backend rejected the call.
    #[error("{operation} on {collection} failed: {message}")]
    Backend {
        operation: StoreOp,
        collection: String,
        message: String,
    },

    /// A document with the same `_id` already exists.
    #[error("duplicate _id {id} in {collection}")]
    Conflict { collection: String, id: String },

    /// An update could not be applied to the matched document.
    #[error("invalid update at {path}: {reason}")]
    InvalidUpdate { path: String, reason: String },

    /// Data in the store is not in the expected shape.
    #[error("data corruption in {collection}: {detail}")]
    DataCorruption { collection: String, detail: String },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts and connectivity failures are transient; everything else is
    /// returned to the caller on the first occurrence.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// Conjunction of equality clauses on (possibly dotted) field paths.
///
/// Equality is exact JSON equality: a string `"64f..."` does not match an
/// extended `{"$oid": "64f..."}` value. Callers that hold an identifier of
/// unknown shape query once per representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching documents whose `field` equals `value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    /// Add another equality clause.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// The clauses in insertion order.
    #[must_use]
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Whether `doc` satisfies every clause.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(path, expected)| get_path(doc, path) == Some(expected))
    }

    /// Render as a nested JSON object suitable for JSONB containment (`@>`).
    #[must_use]
    pub fn to_containment(&self) -> Value {
        let mut root = Document::new();
        for (path, value) in &self.clauses {
            // Paths are built from our own constants; a clash just overwrites.
            let _ = set_path(&mut root, path, value.clone());
        }
        Value::Object(root)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sort specification for [`DocumentStore::find`].
///
/// Documents with equal (or missing) sort keys keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    #[must_use]
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Compare two documents by this sort key.
    #[must_use]
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_values(get_path(a, &self.field), get_path(b, &self.field));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Missing values sort first; strings compare lexically, numbers numerically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Update operators applied by [`DocumentStore::update_one`].
///
/// `set` writes a value at a dotted path, creating intermediate objects.
/// `push` appends to the array at a dotted path, creating it if absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    push: Vec<(String, Value)>,
}

impl Update {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `$set` a field.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    /// `$push` onto an array field.
    #[must_use]
    pub fn push(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.push((path.into(), value.into()));
        self
    }

    /// Paths this update writes, for diagnostics.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.set
            .iter()
            .chain(&self.push)
            .map(|(path, _)| path.clone())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.push.is_empty()
    }

    /// Apply to a document in place.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidUpdate` if a `push` targets a non-array value
    /// or a path tries to write into a non-object intermediate that is not null.
    pub fn apply(&self, doc: &mut Document) -> Result<(), StoreError> {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone())?;
        }
        for (path, value) in &self.push {
            match get_path_mut(doc, path) {
                Some(Value::Array(items)) => items.push(value.clone()),
                Some(Value::Null) | None => set_path(doc, path, Value::Array(vec![value.clone()]))?,
                Some(_) => {
                    return Err(StoreError::InvalidUpdate {
                        path: path.clone(),
                        reason: "target is not an array".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Result of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Read the value at a dotted path.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = doc.get_mut(segments.next()?)?;
    for segment in segments {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// A `null` intermediate is replaced by an object; any other non-object
/// intermediate is an error rather than being silently discarded.
///
/// # Errors
///
/// Returns `StoreError::InvalidUpdate` when an intermediate segment holds a
/// scalar or array.
pub fn set_path(doc: &mut Document, path: &str, value: Value) -> Result<(), StoreError> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut target = doc;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            let slot = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if slot.is_null() {
                *slot = Value::Object(Document::new());
            }
            target = slot.as_object_mut().ok_or_else(|| StoreError::InvalidUpdate {
                path: path.to_string(),
                reason: format!("'{segment}' is not an object"),
            })?;
        }
    }
    target.insert(leaf.to_string(), value);
    Ok(())
}

/// Canonical string form of a document's `_id`, if it has one.
///
/// Extended object ids render as their hex; strings as themselves.
#[must_use]
pub fn id_string(doc: &Document) -> Option<String> {
    let id = doc.get(ID_FIELD)?;
    if let Some(oid) = ObjectId::from_json(id) {
        return Some(oid.to_hex());
    }
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Ensure the document has an `_id`, generating an object id if absent.
///
/// Returns the (possibly new) `_id` value.
pub fn ensure_id(doc: &mut Document) -> Value {
    match doc.get(ID_FIELD) {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            let id = ObjectId::new().to_extended_json();
            doc.insert(ID_FIELD.to_string(), id.clone());
            id
        }
    }
}

/// Minimal document store interface.
///
/// Implementations must be safe to share across tasks. Every method issues a
/// single logical round-trip; timeouts and retries are layered on top by
/// [`GuardedStore`].
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// First document in `collection` matching `filter`, in insertion order.
    async fn find_one(&self, collection: &str, filter: &Filter)
    -> Result<Option<Document>, StoreError>;

    /// All documents in `collection` matching `filter`, optionally sorted.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError>;

    /// Insert a document, generating an `_id` if it has none.
    ///
    /// Returns the document's `_id`.
    async fn insert_one(&self, collection: &str, document: Document)
    -> Result<Value, StoreError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
