//! Integration tests for Carbridge.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p carbridge-integration-tests
//! ```
//!
//! Everything runs against the in-memory store. The wrappers here make it
//! misbehave on demand:
//!
//! - [`FaultyStore`] fails, stalls or delays chosen operations
//! - [`RecordingStore`] records every call so probe order can be asserted
//! - [`RecordingNotifier`] captures notifications
//!
//! # Test Categories
//!
//! - `resolution` - Cross-collection lookups and identifier shapes
//! - `shipments` - Shipping log, projection and partial reconciliation
//! - `tokens` - Secret rotation and principal kinds
//! - `inquiries` - Replies and customer enrichment

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use carbridge_reconcile::notify::{Notification, Notifier, NotifyError, TracingNotifier};
use carbridge_reconcile::store::{
    Document, DocumentStore, Filter, Sort, StoreError, StoreOp, Update, UpdateResult,
};
use carbridge_reconcile::{
    GuardedStore, MemoryStore, Reconciler, RetryPolicy, SecretRing, TokenVerifier,
};
use secrecy::SecretString;

/// Signing secret used by [`reconciler`].
pub const TEST_SECRET: &str = "kq8Zr2vLx9TmP4wN7bYc3HfJ6sDg1AeU";

/// What an injected fault does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Fail with a transient `Unavailable` error.
    Unavailable,
    /// Fail with a non-transient `Backend` error.
    Backend,
    /// Sleep before delegating.
    Stall(Duration),
    /// Delegate, then sleep before answering. The call takes effect even if
    /// the caller gives up waiting.
    Lag(Duration),
}

#[derive(Debug, Clone)]
struct Fault {
    op: StoreOp,
    collection: String,
    kind: FaultKind,
    /// `None` fires forever.
    remaining: Option<u32>,
}

/// Store wrapper that injects failures into chosen calls.
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    faults: Mutex<Vec<Fault>>,
}

impl FaultyStore {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Inject a fault for every `op` on `collection`.
    pub async fn fail_always(&self, op: StoreOp, collection: &str, kind: FaultKind) {
        self.push(op, collection, kind, None).await;
    }

    /// Inject a fault for the next `times` calls of `op` on `collection`.
    pub async fn fail_times(&self, op: StoreOp, collection: &str, kind: FaultKind, times: u32) {
        self.push(op, collection, kind, Some(times)).await;
    }

    /// Remove all faults.
    pub async fn clear(&self) {
        self.faults.lock().await.clear();
    }

    async fn push(&self, op: StoreOp, collection: &str, kind: FaultKind, remaining: Option<u32>) {
        self.faults.lock().await.push(Fault {
            op,
            collection: collection.to_string(),
            kind,
            remaining,
        });
    }

    /// Consume a matching fault, if any.
    async fn take(&self, op: StoreOp, collection: &str) -> Option<FaultKind> {
        let mut faults = self.faults.lock().await;
        let fault = faults
            .iter_mut()
            .find(|f| f.op == op && f.collection == collection && f.remaining != Some(0))?;
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        Some(fault.kind)
    }

    /// Run `call` under whatever fault matches `op` on `collection`.
    async fn run<T>(
        &self,
        op: StoreOp,
        collection: &str,
        call: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        match self.take(op, collection).await {
            None => call.await,
            Some(FaultKind::Unavailable) => Err(StoreError::Unavailable {
                operation: op,
                collection: collection.to_string(),
                message: "injected".to_string(),
            }),
            Some(FaultKind::Backend) => Err(StoreError::Backend {
                operation: op,
                collection: collection.to_string(),
                message: "injected".to_string(),
            }),
            Some(FaultKind::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                call.await
            }
            Some(FaultKind::Lag(delay)) => {
                let result = call.await;
                tokio::time::sleep(delay).await;
                result
            }
        }
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.run(StoreOp::FindOne, collection, self.inner.find_one(collection, filter))
            .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        self.run(StoreOp::Find, collection, self.inner.find(collection, filter, sort))
            .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        self.run(
            StoreOp::UpdateOne,
            collection,
            self.inner.update_one(collection, filter, update),
        )
        .await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Value, StoreError> {
        self.run(
            StoreOp::InsertOne,
            collection,
            self.inner.insert_one(collection, document),
        )
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run(StoreOp::Ping, "", self.inner.ping()).await
    }
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: StoreOp,
    pub collection: String,
    /// Filter clauses, empty for inserts and pings.
    pub clauses: Vec<(String, Value)>,
}

/// Store wrapper that records every call.
#[derive(Debug)]
pub struct RecordingStore {
    inner: Arc<dyn DocumentStore>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStore {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    /// `(collection, field, value)` for every `find_one`, in call order.
    pub async fn probes(&self) -> Vec<(String, String, Value)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.op == StoreOp::FindOne)
            .filter_map(|c| {
                c.clauses
                    .first()
                    .map(|(field, value)| (c.collection.clone(), field.clone(), value.clone()))
            })
            .collect()
    }

    pub async fn reset(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, op: StoreOp, collection: &str, filter: Option<&Filter>) {
        self.calls.lock().await.push(Call {
            op,
            collection: collection.to_string(),
            clauses: filter.map(|f| f.clauses().to_vec()).unwrap_or_default(),
        });
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.record(StoreOp::FindOne, collection, Some(filter)).await;
        self.inner.find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        self.record(StoreOp::Find, collection, Some(filter)).await;
        self.inner.find(collection, filter, sort).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        self.record(StoreOp::UpdateOne, collection, Some(filter)).await;
        self.inner.update_one(collection, filter, update).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Value, StoreError> {
        self.record(StoreOp::InsertOne, collection, None).await;
        self.inner.insert_one(collection, document).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.record(StoreOp::Ping, "", None).await;
        self.inner.ping().await
    }
}

/// Notifier that keeps every notification, optionally failing.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose deliveries all fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        if self.fail {
            return Err(NotifyError::Delivery("injected".to_string()));
        }
        Ok(())
    }
}

/// Token verifier accepting [`TEST_SECRET`] only.
#[must_use]
pub fn verifier() -> TokenVerifier {
    let ring = SecretRing::new(Some(SecretString::from(TEST_SECRET)), Vec::new(), false);
    TokenVerifier::new(ring, 0)
}

/// Reconciler over `store` with a tracing notifier.
#[must_use]
pub fn reconciler(store: Arc<dyn DocumentStore>) -> Reconciler {
    Reconciler::new(store, verifier(), Arc::new(TracingNotifier), false)
}

/// Wrap `store` in a guard with short timeouts and fast retries.
#[must_use]
pub fn guarded(store: Arc<dyn DocumentStore>, timeout: Duration, max_attempts: u32) -> Arc<GuardedStore> {
    Arc::new(GuardedStore::new(
        store,
        RetryPolicy {
            timeout,
            max_attempts,
            base_backoff: Duration::from_millis(1),
        },
    ))
}

/// A fresh in-memory store.
#[must_use]
pub fn memory() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
