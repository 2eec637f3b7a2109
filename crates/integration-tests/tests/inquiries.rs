//! Inquiry replies: storage, customer enrichment and notification.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;

use carbridge_integration_tests::{RecordingNotifier, memory, verifier};
use carbridge_reconcile::inquiry::{InquiryError, REPLY_EVENT, ReplyInput};
use carbridge_reconcile::{Field, MemoryStore, Reconciler};

const INQUIRY: &str = "64f1c2a9e4b0a1b2c3d4e5d4";
const CUSTOMER: &str = "64f1c2a9e4b0a1b2c3d4e5c1";

fn reply(message: &str) -> ReplyInput {
    ReplyInput {
        message: message.to_string(),
        author: "sales@carbridge.example".to_string(),
        author_role: "manager".to_string(),
    }
}

async fn store() -> Arc<MemoryStore> {
    let store = memory();
    store
        .seed("inquiries", [json!({
            "_id": { "$oid": INQUIRY },
            "customerName": "Kofi Mensah",
            "customerEmail": "Kofi@Example.com",
            "message": "Is the Land Cruiser still available?",
            "carDetailsSnapshot": { "carMake": "Toyota", "carModel": "Land Cruiser", "carYear": "2008" }
        })])
        .await;
    store
        .seed("customers", [json!({
            "_id": { "$oid": CUSTOMER },
            "email": "kofi@example.com",
            "firstName": "Kofi",
            "lastName": "Mensah",
            "phone": "+233 20 000 0000"
        })])
        .await;
    store
}

#[tokio::test]
async fn test_reply_is_stored_and_customer_found_by_email() {
    let store = store().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let reconciler = Reconciler::new(store.clone(), verifier(), notifier.clone(), false);

    let outcome = reconciler
        .reply_to_inquiry(&json!(INQUIRY), &reply("  Yes, it is. Viewing on Friday?  "))
        .await
        .unwrap();

    assert_eq!(outcome.inquiry_id, INQUIRY);
    assert_eq!(outcome.customer_source.as_deref(), Some("customers"));
    assert_eq!(outcome.customer.id, Field::Known(CUSTOMER.to_string()));
    assert_eq!(outcome.customer.phone, Field::Known("+233 20 000 0000".to_string()));
    assert_eq!(
        outcome.vehicle.as_ref().and_then(|v| v.title()).as_deref(),
        Some("2008 Toyota Land Cruiser")
    );
    assert!(outcome.notified);

    let inquiry = store.documents("inquiries").await.into_iter().next().unwrap();
    let replies = inquiry["replies"].as_array().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["message"], "Yes, it is. Viewing on Friday?");
    assert_eq!(replies[0]["authorRole"], "manager");

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, REPLY_EVENT);
    assert_eq!(sent[0].recipient(), Some("kofi@example.com"));
}

#[tokio::test]
async fn test_unknown_customer_uses_inquiry_fields() {
    let store = memory();
    store
        .seed("inquiries", [json!({
            "_id": INQUIRY,
            "customerName": "Walk In",
            "customerEmail": "walkin@example.com"
        })])
        .await;
    let reconciler = Reconciler::new(
        store,
        verifier(),
        Arc::new(RecordingNotifier::default()),
        false,
    );

    let outcome = reconciler
        .reply_to_inquiry(&json!(INQUIRY), &reply("Thanks for reaching out"))
        .await
        .unwrap();

    assert!(outcome.customer_source.is_none());
    assert_eq!(outcome.customer.first_name, Field::Known("Walk".to_string()));
    assert_eq!(outcome.customer.email, Field::Known("walkin@example.com".to_string()));
    assert!(outcome.vehicle.is_none());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_reply() {
    let store = store().await;
    let reconciler = Reconciler::new(
        store.clone(),
        verifier(),
        Arc::new(RecordingNotifier::failing()),
        false,
    );

    let outcome = reconciler
        .reply_to_inquiry(&json!({ "$oid": INQUIRY }), &reply("We'll call you"))
        .await
        .unwrap();

    assert!(!outcome.notified);
    let inquiry = store.documents("inquiries").await.into_iter().next().unwrap();
    assert_eq!(inquiry["replies"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_replies_write_nothing() {
    let store = store().await;
    let reconciler = Reconciler::new(
        store.clone(),
        verifier(),
        Arc::new(RecordingNotifier::default()),
        false,
    );

    assert!(matches!(
        reconciler.reply_to_inquiry(&json!(INQUIRY), &reply("   ")).await,
        Err(InquiryError::EmptyMessage)
    ));
    assert!(matches!(
        reconciler
            .reply_to_inquiry(&json!("64f1c2a9e4b0a1b2c3d4ffff"), &reply("hello"))
            .await,
        Err(InquiryError::NotFound(_))
    ));

    let inquiry = store.documents("inquiries").await.into_iter().next().unwrap();
    assert!(inquiry.get("replies").is_none());
}
