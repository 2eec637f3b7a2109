//! Entry point tying the store, resolver, verifier and notifier together.
//!
//! Route handlers and the CLI talk to a [`Reconciler`]; nothing outside this
//! crate needs to know which collections an entity may live in.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use carbridge_core::PrincipalKind;

use crate::auth::{AuthError, Principal, TokenVerifier};
use crate::config::{ConfigError, ReconcileConfig, StoreBackend};
use crate::enrich::{Customer, Vehicle, enrich_customer, enrich_vehicle};
use crate::inquiry::{InquiryError, InquiryService, ReplyInput, ReplyOutcome};
use crate::notify::{Notifier, TracingNotifier};
use crate::resolver::{CollectionResolver, EntityReference, MatchPath, ResolveError};
use crate::shipment::timeline::SHIPPING_EVENT_TYPE;
use crate::shipment::{
    RebuildOutcome, ShipmentError, ShipmentOutcome, ShipmentReconciler, StatusUpdate,
};
use crate::store::{
    Document, DocumentStore, GuardedStore, MemoryStore, PgDocumentStore, StoreError,
    postgres::shared_pool,
};

/// Errors while building a [`Reconciler`].
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cannot read seed file {path}: {source}")]
    SeedFile {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid seed file: {0}")]
    SeedFormat(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An entity view with the collection it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Found<T> {
    #[serde(flatten)]
    pub entity: T,
    pub source_collection: String,
    #[serde(skip)]
    pub matched_by: Option<MatchPath>,
}

/// Shipping state of a vehicle as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingView {
    pub vehicle: Vehicle,
    pub source_collection: String,
    /// The vehicle's `shipping` projection, or `null` if it has none.
    pub shipping: Value,
    /// Shipping entries of the timeline, in timeline order.
    pub timeline: Vec<Value>,
}

/// Shared reconciliation service. Cheap to clone.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    store: Arc<dyn DocumentStore>,
    resolver: CollectionResolver,
    shipments: ShipmentReconciler,
    inquiries: InquiryService,
    verifier: TokenVerifier,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.inner.store)
            .field("verifier", &self.inner.verifier)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Assemble a reconciler over an existing store.
    ///
    /// The store is used as given; wrap it in a [`GuardedStore`] first if it
    /// needs timeouts and retry.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: TokenVerifier,
        notifier: Arc<dyn Notifier>,
        concurrent_probes: bool,
    ) -> Self {
        let resolver = CollectionResolver::new(store.clone(), concurrent_probes);
        Self {
            inner: Arc::new(ReconcilerInner {
                shipments: ShipmentReconciler::new(store.clone(), resolver.clone()),
                inquiries: InquiryService::new(store.clone(), resolver.clone(), notifier),
                store,
                resolver,
                verifier,
            }),
        }
    }

    /// Build from configuration, connecting to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `SetupError` if the database is unreachable or the memory seed
    /// file cannot be loaded.
    pub async fn from_config(config: &ReconcileConfig) -> Result<Self, SetupError> {
        let backend: Arc<dyn DocumentStore> = match &config.backend {
            StoreBackend::Memory { seed: None } => {
                info!("Using in-memory document store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Memory { seed: Some(path) } => {
                info!(path = %path.display(), "Using in-memory document store with seed");
                Arc::new(load_seed(path).await?)
            }
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingEnvVar("CARBRIDGE_DATABASE_URL".to_string()))?;
                let pool = shared_pool(url).await?;
                info!("Using PostgreSQL document store");
                Arc::new(PgDocumentStore::new(pool.clone()))
            }
        };

        let store = Arc::new(GuardedStore::new(backend, config.retry));
        let verifier = TokenVerifier::new(config.auth.secret_ring(), config.auth.leeway.as_secs());
        Ok(Self::new(
            store,
            verifier,
            Arc::new(TracingNotifier),
            config.concurrent_probes,
        ))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// Resolve a vehicle and return its merged view.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` on store failure. Absence is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn resolve_vehicle(
        &self,
        reference: &EntityReference,
    ) -> Result<Option<Found<Vehicle>>, ResolveError> {
        let resolved = self.inner.resolver.resolve(reference).await?.into_option();
        Ok(resolved.map(|r| Found {
            entity: enrich_vehicle(&Document::new(), Some(&r.record)),
            source_collection: r.source_collection.to_string(),
            matched_by: Some(r.matched_by),
        }))
    }

    /// Resolve a vehicle and return its shipping projection and timeline.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` on store failure. Absence is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn vehicle_shipping(
        &self,
        reference: &EntityReference,
    ) -> Result<Option<ShippingView>, ResolveError> {
        let resolved = self.inner.resolver.resolve(reference).await?.into_option();
        Ok(resolved.map(|r| {
            let timeline = r
                .record
                .get("timeline")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| {
                            e.get("type").and_then(Value::as_str) == Some(SHIPPING_EVENT_TYPE)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            ShippingView {
                vehicle: enrich_vehicle(&Document::new(), Some(&r.record)),
                source_collection: r.source_collection.to_string(),
                shipping: r.record.get("shipping").cloned().unwrap_or(Value::Null),
                timeline,
            }
        }))
    }

    /// Resolve a customer and return its merged view.
    ///
    /// The reference's email, if any, doubles as a fragment so the view is
    /// never poorer than what the caller already knew.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` on store failure. Absence is `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn resolve_customer(
        &self,
        reference: &EntityReference,
    ) -> Result<Option<Found<Customer>>, ResolveError> {
        let resolved = self.inner.resolver.resolve(reference).await?.into_option();
        let mut fragment = Document::new();
        if let Some(email) = reference.normalized_email() {
            fragment.insert("email".to_string(), Value::String(email));
        }
        Ok(resolved.map(|r| Found {
            entity: enrich_customer(&fragment, Some(&r.record)),
            source_collection: r.source_collection.to_string(),
            matched_by: Some(r.matched_by),
        }))
    }

    /// Merge a customer fragment with an optional authoritative record.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn enrich_customer(&self, fragment: &Document, authoritative: Option<&Document>) -> Customer {
        enrich_customer(fragment, authoritative)
    }

    /// Merge a vehicle fragment with an optional authoritative record.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn enrich_vehicle(&self, fragment: &Document, authoritative: Option<&Document>) -> Vehicle {
        enrich_vehicle(fragment, authoritative)
    }

    /// Record a shipping status update.
    ///
    /// # Errors
    ///
    /// See [`ShipmentReconciler::record_update`].
    pub async fn record_shipment_update(
        &self,
        vehicle: &EntityReference,
        update: StatusUpdate,
    ) -> Result<ShipmentOutcome, ShipmentError> {
        self.inner.shipments.record_update(vehicle, update).await
    }

    /// Regenerate a vehicle's shipping projection from its log.
    ///
    /// # Errors
    ///
    /// See [`ShipmentReconciler::rebuild_projection`].
    pub async fn rebuild_projection(
        &self,
        vehicle: &EntityReference,
    ) -> Result<RebuildOutcome, ShipmentError> {
        self.inner.shipments.rebuild_projection(vehicle).await
    }

    /// Reply to an inquiry and notify the customer.
    ///
    /// # Errors
    ///
    /// See [`InquiryService::reply`].
    pub async fn reply_to_inquiry(
        &self,
        inquiry: &Value,
        reply: &ReplyInput,
    ) -> Result<ReplyOutcome, InquiryError> {
        self.inner.inquiries.reply(inquiry, reply).await
    }

    /// Verify a bearer credential for a principal of `expected` kind.
    ///
    /// # Errors
    ///
    /// See [`TokenVerifier::verify`].
    pub fn verify_token(
        &self,
        credential: Option<&str>,
        expected: PrincipalKind,
    ) -> Result<Principal, AuthError> {
        self.inner.verifier.verify(credential, expected)
    }

    /// Check that the store answers.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.inner.store.ping().await
    }
}

async fn load_seed(path: &Path) -> Result<MemoryStore, SetupError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| SetupError::SeedFile {
        path: path.display().to_string(),
        source,
    })?;
    let snapshot: Value = serde_json::from_str(&text)?;
    Ok(MemoryStore::from_snapshot(snapshot)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{TokenClaims, mint};
    use crate::config::AuthConfig;
    use crate::store::RetryPolicy;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;

    fn memory_config(seed: Option<std::path::PathBuf>) -> ReconcileConfig {
        ReconcileConfig {
            backend: StoreBackend::Memory { seed },
            database_url: None,
            retry: RetryPolicy::default(),
            concurrent_probes: true,
            auth: AuthConfig {
                current_secret: Some(SecretString::from("a-long-and-random-test-secret-4f9a")),
                previous_secrets: Vec::new(),
                accept_legacy_secret: false,
                leeway: Duration::from_secs(0),
            },
        }
    }

    #[tokio::test]
    async fn test_from_config_memory_with_seed() {
        let path = std::env::temp_dir().join(format!("carbridge-seed-{}.json", std::process::id()));
        tokio::fs::write(
            &path,
            json!({ "customers": [{ "_id": "c1", "firstName": "Ada", "email": "ADA@x.com" }] })
                .to_string(),
        )
        .await
        .unwrap();

        let reconciler = Reconciler::from_config(&memory_config(Some(path.clone())))
            .await
            .unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert!(reconciler.ping().await.is_ok());
        let found = reconciler
            .resolve_customer(&EntityReference::customer("c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.source_collection, "customers");
        assert_eq!(found.entity.email.as_option().unwrap(), "ada@x.com");

        let value = serde_json::to_value(&found).unwrap();
        assert_eq!(value["sourceCollection"], json!("customers"));
        assert_eq!(value["firstName"], json!("Ada"));
    }

    #[tokio::test]
    async fn test_missing_seed_file() {
        let result =
            Reconciler::from_config(&memory_config(Some("/nonexistent/seed.json".into()))).await;
        assert!(matches!(result, Err(SetupError::SeedFile { .. })));
    }

    #[tokio::test]
    async fn test_verify_token_through_facade() {
        let config = memory_config(None);
        let reconciler = Reconciler::from_config(&config).await.unwrap();
        let secret = config.auth.current_secret.clone().unwrap();
        let token = mint(&TokenClaims::customer("c1", chrono::Duration::hours(1)), &secret).unwrap();

        let principal = reconciler
            .verify_token(Some(&token), PrincipalKind::Customer)
            .unwrap();
        assert_eq!(principal.subject_id, "c1");
        assert!(matches!(
            reconciler.verify_token(Some(&token), PrincipalKind::Admin),
            Err(AuthError::WrongPrincipalKind { .. })
        ));
    }
}
