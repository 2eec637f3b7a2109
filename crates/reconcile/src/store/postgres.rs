//! `PostgreSQL` document store.
//!
//! # Table: `carbridge.documents`
//!
//! One row per document: `(seq, collection, doc_id, body JSONB)`. Filters are
//! evaluated with JSONB containment (`body @> $filter`), backed by a GIN index.
//! `seq` gives insertion order for `find_one` and tie-breaks sorted reads.
//!
//! Updates lock the single matched row (`FOR UPDATE`), apply the operators in
//! Rust and write the body back, so each `update_one` is atomic for its
//! document. Nothing spans documents.
//!
//! # Migrations
//!
//! Stored in `crates/reconcile/migrations/` and run via:
//! ```bash
//! cargo run -p carbridge-cli -- migrate
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::instrument;

use super::{
    Document, DocumentStore, Filter, Sort, SortDirection, StoreError, StoreOp, Update,
    UpdateResult, ensure_id, id_string,
};

/// Process-wide pool; created on first use and reused until shutdown.
static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Get the shared connection pool, creating it on first call.
///
/// Later calls return the existing pool regardless of `database_url`.
///
/// # Errors
///
/// Returns `sqlx::Error` if the first connection cannot be established.
pub async fn shared_pool(database_url: &SecretString) -> Result<&'static PgPool, sqlx::Error> {
    POOL.get_or_try_init(|| create_pool(database_url)).await
}

/// Close the shared pool, if it was ever created.
pub async fn close_shared_pool() {
    if let Some(pool) = POOL.get() {
        pool.close().await;
        tracing::info!("Document store pool closed");
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Document store backed by a JSONB table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error onto the store taxonomy.
///
/// Pool exhaustion and socket failures are transient; everything else is not.
fn map_err(operation: StoreOp, collection: &str, err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable {
                operation,
                collection: collection.to_string(),
                message: err.to_string(),
            }
        }
        _ => StoreError::Backend {
            operation,
            collection: collection.to_string(),
            message: err.to_string(),
        },
    }
}

fn into_document(collection: &str, body: Value) -> Result<Document, StoreError> {
    match body {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::DataCorruption {
            collection: collection.to_string(),
            detail: format!("expected object body, found {other}"),
        }),
    }
}

fn sort_path(sort: &Sort) -> Vec<String> {
    sort.field.split('.').map(str::to_string).collect()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self, filter), fields(collection = %collection))]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT body FROM carbridge.documents
            WHERE collection = $1 AND body @> $2
            ORDER BY seq
            LIMIT 1
            ",
        )
        .bind(collection)
        .bind(Json(filter.to_containment()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_err(StoreOp::FindOne, collection, &e))?;

        row.map(|r| {
            let Json(body): Json<Value> = r
                .try_get("body")
                .map_err(|e| map_err(StoreOp::FindOne, collection, &e))?;
            into_document(collection, body)
        })
        .transpose()
    }

    #[instrument(skip(self, filter, sort), fields(collection = %collection))]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        let sql = match sort.map(|s| s.direction) {
            None => {
                r"
                SELECT body FROM carbridge.documents
                WHERE collection = $1 AND body @> $2
                ORDER BY seq
                "
            }
            Some(SortDirection::Ascending) => {
                r"
                SELECT body FROM carbridge.documents
                WHERE collection = $1 AND body @> $2
                ORDER BY body #>> $3 ASC NULLS FIRST, seq ASC
                "
            }
            Some(SortDirection::Descending) => {
                r"
                SELECT body FROM carbridge.documents
                WHERE collection = $1 AND body @> $2
                ORDER BY body #>> $3 DESC NULLS LAST, seq ASC
                "
            }
        };

        let mut query = sqlx::query(sql)
            .bind(collection)
            .bind(Json(filter.to_containment()));
        if let Some(sort) = sort {
            query = query.bind(sort_path(sort));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_err(StoreOp::Find, collection, &e))?;

        rows.into_iter()
            .map(|r| {
                let Json(body): Json<Value> = r
                    .try_get("body")
                    .map_err(|e| map_err(StoreOp::Find, collection, &e))?;
                into_document(collection, body)
            })
            .collect()
    }

    #[instrument(skip(self, filter, update), fields(collection = %collection))]
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let op = StoreOp::UpdateOne;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_err(op, collection, &e))?;

        let row = sqlx::query(
            r"
            SELECT seq, body FROM carbridge.documents
            WHERE collection = $1 AND body @> $2
            ORDER BY seq
            LIMIT 1
            FOR UPDATE
            ",
        )
        .bind(collection)
        .bind(Json(filter.to_containment()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_err(op, collection, &e))?;

        let Some(row) = row else {
            return Ok(UpdateResult::default());
        };

        let seq: i64 = row.try_get("seq").map_err(|e| map_err(op, collection, &e))?;
        let Json(body): Json<Value> = row
            .try_get("body")
            .map_err(|e| map_err(op, collection, &e))?;
        let original = into_document(collection, body)?;

        let mut updated = original.clone();
        update.apply(&mut updated)?;
        if updated == original {
            return Ok(UpdateResult {
                matched: 1,
                modified: 0,
            });
        }

        sqlx::query(
            r"
            UPDATE carbridge.documents
            SET body = $1, updated_at = NOW()
            WHERE seq = $2
            ",
        )
        .bind(Json(Value::Object(updated)))
        .bind(seq)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_err(op, collection, &e))?;

        tx.commit().await.map_err(|e| map_err(op, collection, &e))?;

        Ok(UpdateResult {
            matched: 1,
            modified: 1,
        })
    }

    #[instrument(skip(self, document), fields(collection = %collection))]
    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<Value, StoreError> {
        let id = ensure_id(&mut document);
        let doc_id = id_string(&document).unwrap_or_default();

        let result = sqlx::query(
            r"
            INSERT INTO carbridge.documents (collection, doc_id, body)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(collection)
        .bind(&doc_id)
        .bind(Json(Value::Object(document)))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e)
                if e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation()) =>
            {
                Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    id: doc_id,
                })
            }
            Err(e) => Err(map_err(StoreOp::InsertOne, collection, &e)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_err(StoreOp::Ping, "*", &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        let err = map_err(StoreOp::Find, "vehicles", &sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        let err = map_err(StoreOp::Find, "vehicles", &sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_sort_path_splits_dotted_field() {
        assert_eq!(
            sort_path(&Sort::ascending("shipping.lastUpdated")),
            vec!["shipping".to_string(), "lastUpdated".to_string()]
        );
    }

    #[test]
    fn test_into_document_rejects_scalars() {
        assert!(into_document("vehicles", Value::from(1)).is_err());
        assert!(into_document("vehicles", serde_json::json!({ "a": 1 })).is_ok());
    }
}
