//! Timeout and bounded-retry wrapper for any [`DocumentStore`].
//!
//! Every call gets the same time budget. A call that times out or hits a
//! connectivity failure is retried with exponential backoff up to
//! `max_attempts` total attempts; any other error is returned immediately.
//! A timeout is never turned into "not found".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Document, DocumentStore, Filter, Sort, StoreError, StoreOp, Update, UpdateResult, ensure_id,
};

/// Retry and timeout settings for store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time budget for a single attempt.
    pub timeout: Duration,
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (1-based; attempt 1 has none).
    #[must_use]
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_backoff.saturating_mul(1 << exponent)
    }
}

/// Store wrapper adding per-call timeouts and bounded retry.
#[derive(Debug, Clone)]
pub struct GuardedStore {
    inner: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl GuardedStore {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn run<T, F, Fut>(&self, op: StoreOp, collection: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout {
                    operation: op,
                    collection: collection.to_string(),
                    timeout: self.policy.timeout,
                }),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < attempts => {
                    attempt += 1;
                    let delay = self.policy.backoff_before(attempt);
                    warn!(
                        operation = %op,
                        collection = %collection,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl DocumentStore for GuardedStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.run(StoreOp::FindOne, collection, || {
            self.inner.find_one(collection, filter)
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        self.run(StoreOp::Find, collection, || {
            self.inner.find(collection, filter, sort)
        })
        .await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        self.run(StoreOp::UpdateOne, collection, || {
            self.inner.update_one(collection, filter, update)
        })
        .await
    }

    /// Inserts are made retry-safe by fixing the `_id` before the first
    /// attempt: if an attempt timed out after the row landed, the retry hits a
    /// duplicate-key conflict, which is reported as success.
    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Value, StoreError> {
        let id = ensure_id(&mut document);
        let mut attempted = false;
        let result = self
            .run(StoreOp::InsertOne, collection, || {
                let retry = std::mem::replace(&mut attempted, true);
                let document = document.clone();
                let inner = Arc::clone(&self.inner);
                async move {
                    match inner.insert_one(collection, document).await {
                        Err(StoreError::Conflict { .. }) if retry => Ok(Value::Null),
                        other => other,
                    }
                }
            })
            .await?;

        if result.is_null() {
            debug!(collection = %collection, "Insert retry found existing document");
        }
        Ok(id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run(StoreOp::Ping, "*", || self.inner.ping()).await
    }
}
