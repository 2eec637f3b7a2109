//! Replies to customer inquiries.
//!
//! An inquiry embeds whatever the customer typed into the contact form
//! (`customerName`, `customerEmail`, maybe a `userId`) plus a
//! `carDetailsSnapshot`. Replying appends to its `replies` array and notifies
//! the customer using the merged view of the fragment and the customer record.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::entity::{ID_FIELDS, INQUIRIES, first_non_empty};
use crate::enrich::{Customer, Vehicle, enrich_customer, enrich_vehicle};
use crate::identifier;
use crate::notify::{Notification, Notifier};
use crate::resolver::{CollectionResolver, EntityReference, ResolveError};
use crate::store::{Document, DocumentStore, Filter, StoreError, Update};

/// Event name used for reply notifications.
pub const REPLY_EVENT: &str = "inquiry.reply";

/// Inquiry fields that may hold the inquiring customer's id.
const CUSTOMER_REF_FIELDS: [&str; 2] = ["userId", "customerId"];

/// Inquiry fields that may hold the inquiring customer's email.
const CUSTOMER_EMAIL_FIELDS: [&str; 2] = ["customerEmail", "email"];

/// Longest reply accepted, in characters.
pub const MAX_REPLY_LEN: usize = 10_000;

/// A reply as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyInput {
    pub message: String,
    pub author: String,
    pub author_role: String,
}

/// A reply as stored on the inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredReply<'a> {
    message: &'a str,
    author: &'a str,
    author_role: &'a str,
    created_at: String,
}

/// Result of a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOutcome {
    pub inquiry_id: String,
    pub customer: Customer,
    /// Collection the customer record was found in, if it was found.
    pub customer_source: Option<String>,
    pub vehicle: Option<Vehicle>,
    pub notified: bool,
}

#[derive(Debug, Error)]
pub enum InquiryError {
    #[error("inquiry not found: {0}")]
    NotFound(String),

    #[error("reply message is empty")]
    EmptyMessage,

    #[error("reply message exceeds {MAX_REPLY_LEN} characters")]
    MessageTooLong,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handles inquiry replies.
#[derive(Debug, Clone)]
pub struct InquiryService {
    store: Arc<dyn DocumentStore>,
    resolver: CollectionResolver,
    notifier: Arc<dyn Notifier>,
}

impl InquiryService {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        resolver: CollectionResolver,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
        }
    }

    /// Append a reply to an inquiry and notify the inquiring customer.
    ///
    /// The reply is stored before the customer is resolved. A notification
    /// failure is logged and reported through `notified`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown inquiry, `EmptyMessage` or
    /// `MessageTooLong` for an unusable reply, and `Store`/`Resolve` for
    /// store failures.
    #[instrument(skip(self, reply), fields(inquiry = %inquiry_ref))]
    pub async fn reply(
        &self,
        inquiry_ref: &Value,
        reply: &ReplyInput,
    ) -> Result<ReplyOutcome, InquiryError> {
        let message = reply.message.trim();
        if message.is_empty() {
            return Err(InquiryError::EmptyMessage);
        }
        if message.chars().count() > MAX_REPLY_LEN {
            return Err(InquiryError::MessageTooLong);
        }

        let (filter, inquiry) = self.find_inquiry(inquiry_ref).await?.ok_or_else(|| {
            InquiryError::NotFound(
                identifier::canonical(inquiry_ref).unwrap_or_else(|| inquiry_ref.to_string()),
            )
        })?;
        let inquiry_id = identifier::canonical(
            ID_FIELDS
                .iter()
                .find_map(|f| inquiry.get(*f))
                .unwrap_or(&Value::Null),
        )
        .unwrap_or_default();

        let stored = StoredReply {
            message,
            author: reply.author.trim(),
            author_role: reply.author_role.trim(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let stored = serde_json::to_value(&stored).unwrap_or(Value::Null);
        let result = self
            .store
            .update_one(INQUIRIES, &filter, &Update::new().push("replies", stored))
            .await?;
        if result.matched == 0 {
            return Err(InquiryError::NotFound(inquiry_id));
        }
        info!(inquiry_id = %inquiry_id, "Reply stored");

        let customer_ref = first_non_empty(&inquiry, &CUSTOMER_REF_FIELDS)
            .cloned()
            .unwrap_or(Value::Null);
        let mut reference = EntityReference::customer(customer_ref);
        if let Some(email) = first_non_empty(&inquiry, &CUSTOMER_EMAIL_FIELDS).and_then(Value::as_str)
        {
            reference = reference.with_email(email);
        }
        let resolved = self.resolver.resolve(&reference).await?.into_option();
        if resolved.is_none() {
            debug!(inquiry_id = %inquiry_id, "Inquiring customer has no record, using inquiry fields");
        }

        let customer = enrich_customer(&inquiry, resolved.as_ref().map(|r| &r.record));
        let vehicle = inquiry
            .get("carDetailsSnapshot")
            .and_then(Value::as_object)
            .map(|snapshot| enrich_vehicle(snapshot, None));

        let notification = Notification {
            event: REPLY_EVENT.to_string(),
            description: format!("New reply to your inquiry from {}", stored_author(reply)),
            customer: customer.clone(),
            vehicle: vehicle.clone(),
        };
        let notified = match self.notifier.notify(&notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(inquiry_id = %inquiry_id, error = %e, "Reply notification failed");
                false
            }
        };

        Ok(ReplyOutcome {
            inquiry_id,
            customer,
            customer_source: resolved.map(|r| r.source_collection.to_string()),
            vehicle,
            notified,
        })
    }

    async fn find_inquiry(
        &self,
        inquiry_ref: &Value,
    ) -> Result<Option<(Filter, Document)>, StoreError> {
        for field in ID_FIELDS {
            for candidate in identifier::candidates(inquiry_ref) {
                let filter = Filter::eq(field, candidate);
                if let Some(doc) = self.store.find_one(INQUIRIES, &filter).await? {
                    return Ok(Some((filter, doc)));
                }
            }
        }
        Ok(None)
    }
}

fn stored_author(reply: &ReplyInput) -> &str {
    let author = reply.author.trim();
    if author.is_empty() { "our team" } else { author }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("smtp down".to_string()));
            }
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }
    }

    fn reply() -> ReplyInput {
        ReplyInput {
            message: "  It is still available.  ".to_string(),
            author: "Sam".to_string(),
            author_role: "sales".to_string(),
        }
    }

    async fn setup(fail: bool) -> (Arc<MemoryStore>, Arc<Recorder>, InquiryService) {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(INQUIRIES, [json!({
                "_id": { "$oid": "64f1c2a9e4b0a1b2c3d4e5b2" },
                "customerName": "Ada Lovelace",
                "customerEmail": "ADA@example.com",
                "carDetailsSnapshot": { "carMake": "Toyota", "carModel": "Supra", "carYear": 1994 }
            })])
            .await;
        store
            .seed("users", [json!({ "_id": "u1", "email": "ada@example.com", "phone": "+44 20 0000" })])
            .await;
        let notifier = Arc::new(Recorder { fail, ..Recorder::default() });
        let resolver = CollectionResolver::new(store.clone(), false);
        let service = InquiryService::new(store.clone(), resolver, notifier.clone());
        (store, notifier, service)
    }

    #[tokio::test]
    async fn test_reply_appends_and_notifies_enriched_customer() {
        let (store, notifier, service) = setup(false).await;
        let outcome = service
            .reply(&json!("64f1c2a9e4b0a1b2c3d4e5b2"), &reply())
            .await
            .unwrap();

        assert!(outcome.notified);
        assert_eq!(outcome.customer_source.as_deref(), Some("users"));
        assert_eq!(outcome.customer.phone.as_option().unwrap(), "+44 20 0000");
        assert_eq!(outcome.customer.full_name.as_option().unwrap(), "Ada Lovelace");
        assert_eq!(outcome.vehicle.unwrap().title().as_deref(), Some("1994 Toyota Supra"));

        let inquiry = store.documents(INQUIRIES).await.remove(0);
        let replies = inquiry["replies"].as_array().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["message"], json!("It is still available."));
        assert_eq!(replies[0]["authorRole"], json!("sales"));

        let sent = notifier.sent.lock().await;
        assert_eq!(sent[0].recipient(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_reply() {
        let (store, _, service) = setup(true).await;
        let outcome = service
            .reply(&json!({ "$oid": "64f1c2a9e4b0a1b2c3d4e5b2" }), &reply())
            .await
            .unwrap();
        assert!(!outcome.notified);
        let inquiry = store.documents(INQUIRIES).await.remove(0);
        assert_eq!(inquiry["replies"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_inquiry_and_empty_message() {
        let (_, _, service) = setup(false).await;
        assert!(matches!(
            service.reply(&json!("nope"), &reply()).await,
            Err(InquiryError::NotFound(_))
        ));
        let empty = ReplyInput {
            message: "   ".to_string(),
            ..reply()
        };
        assert!(matches!(
            service.reply(&json!("64f1c2a9e4b0a1b2c3d4e5b2"), &empty).await,
            Err(InquiryError::EmptyMessage)
        ));
    }
}
