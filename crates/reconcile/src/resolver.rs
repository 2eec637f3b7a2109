//! Cross-collection entity resolution.
//!
//! Given a loosely-typed reference, probe each candidate collection of the
//! entity's kind in priority order, under each identifier field, with each
//! identifier representation, and return the first record found. Customers
//! fall back to an email lookup when no identifier matches.
//!
//! The priority order is fixed. Every reader and writer lands on the same
//! copy when an entity is duplicated across collections.
//!
//! Probes against different collections may run concurrently. The result is
//! the same either way: the highest-priority hit wins regardless of which
//! probe answered first.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::entity::{EMAIL_FIELD, EntityKind, ID_FIELDS};
use crate::identifier;
use crate::store::{Document, DocumentStore, Filter, StoreError};

/// A reference to an entity of unknown storage location.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityReference {
    pub kind: EntityKind,
    /// The identifier as found: string, `{"$oid"}` or anything else.
    pub raw: Value,
    /// Collection the caller believes the entity lives in. Checked against
    /// the result, never used to reorder the probes.
    pub source_hint: Option<String>,
    /// Email fragment for the customer fallback.
    pub email: Option<String>,
}

impl EntityReference {
    #[must_use]
    pub fn vehicle(raw: impl Into<Value>) -> Self {
        Self::new(EntityKind::Vehicle, raw.into())
    }

    #[must_use]
    pub fn customer(raw: impl Into<Value>) -> Self {
        Self::new(EntityKind::Customer, raw.into())
    }

    #[must_use]
    pub const fn new(kind: EntityKind, raw: Value) -> Self {
        Self {
            kind,
            raw,
            source_hint: None,
            email: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.source_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Lowercased, trimmed email, if a usable one was supplied.
    #[must_use]
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}

/// How a record was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "by", content = "field", rename_all = "camelCase")]
pub enum MatchPath {
    ById(&'static str),
    ByEmail,
}

/// A resolved record and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub record: Document,
    pub source_collection: &'static str,
    pub matched_by: MatchPath,
}

/// Outcome of a lookup. Absence is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Resolved),
    NotFound,
}

impl Resolution {
    #[must_use]
    pub fn into_option(self) -> Option<Resolved> {
        match self {
            Self::Found(r) => Some(r),
            Self::NotFound => None,
        }
    }

    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Resolution failures. Only store failures are errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("store error during resolution: {0}")]
    Store(#[from] StoreError),
}

/// Warn when the caller's hint names a different collection than the
/// priority winner. The winner is kept.
fn check_hint(reference: &EntityReference, found: &Resolved) {
    let Some(hint) = reference.source_hint.as_deref() else {
        return;
    };
    if !reference.kind.owns_collection(hint) {
        debug!(hint, kind = %reference.kind, "Ignoring unknown source hint");
    } else if hint.trim() != found.source_collection {
        warn!(
            hint,
            resolved = found.source_collection,
            reference = %reference.raw,
            "Source hint disagrees with higher-priority copy"
        );
    }
}

/// Resolves references against the store.
#[derive(Debug, Clone)]
pub struct CollectionResolver {
    store: Arc<dyn DocumentStore>,
    concurrent: bool,
}

impl CollectionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, concurrent: bool) -> Self {
        Self { store, concurrent }
    }

    /// Resolve `reference` to its authoritative record.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Store` if a probe fails after retries. A probe
    /// failure is never reported as `NotFound`.
    #[instrument(skip(self, reference), fields(kind = %reference.kind))]
    pub async fn resolve(&self, reference: &EntityReference) -> Result<Resolution, ResolveError> {
        let order = reference.kind.collections();
        let candidates = identifier::candidates(&reference.raw);

        if !candidates.is_empty() {
            let probes = order.iter().map(|collection| {
                let filters: Vec<(&'static str, Filter)> = ID_FIELDS
                    .iter()
                    .flat_map(|field| {
                        candidates
                            .iter()
                            .map(move |c| (*field, Filter::eq(*field, c.clone())))
                    })
                    .collect();
                (*collection, filters)
            });

            if let Some(found) = self.first_hit(probes, MatchPath::ById).await? {
                check_hint(reference, &found);
                return Ok(Resolution::Found(found));
            }
        }

        if reference.kind.has_email_fallback()
            && let Some(email) = reference.normalized_email()
        {
            let probes = order.iter().map(|collection| {
                (
                    *collection,
                    vec![(EMAIL_FIELD, Filter::eq(EMAIL_FIELD, email.clone()))],
                )
            });
            if let Some(found) = self.first_hit(probes, |_| MatchPath::ByEmail).await? {
                debug!(collection = found.source_collection, "Resolved by email fallback");
                check_hint(reference, &found);
                return Ok(Resolution::Found(found));
            }
        }

        debug!(
            reference = %reference.raw,
            candidates = candidates.len(),
            "Entity not found in any collection"
        );
        Ok(Resolution::NotFound)
    }

    /// Run per-collection probe lists and return the highest-priority hit.
    async fn first_hit<I>(
        &self,
        probes: I,
        path: impl Fn(&'static str) -> MatchPath,
    ) -> Result<Option<Resolved>, StoreError>
    where
        I: Iterator<Item = (&'static str, Vec<(&'static str, Filter)>)>,
    {
        if self.concurrent {
            let outcomes = join_all(
                probes.map(|(collection, filters)| self.probe_collection(collection, filters)),
            )
            .await;
            // Priority order, not arrival order. An error in a higher-priority
            // collection hides any lower-priority hit.
            for outcome in outcomes {
                if let Some((collection, field, record)) = outcome? {
                    return Ok(Some(Resolved {
                        record,
                        source_collection: collection,
                        matched_by: path(field),
                    }));
                }
            }
            return Ok(None);
        }

        for (collection, filters) in probes {
            if let Some((collection, field, record)) =
                self.probe_collection(collection, filters).await?
            {
                return Ok(Some(Resolved {
                    record,
                    source_collection: collection,
                    matched_by: path(field),
                }));
            }
        }
        Ok(None)
    }

    async fn probe_collection(
        &self,
        collection: &'static str,
        filters: Vec<(&'static str, Filter)>,
    ) -> Result<Option<(&'static str, &'static str, Document)>, StoreError> {
        for (field, filter) in filters {
            if let Some(record) = self.store.find_one(collection, &filter).await? {
                return Ok(Some((collection, field, record)));
            }
        }
        Ok(None)
    }
}
