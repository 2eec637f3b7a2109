//! Router tests over an in-memory store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use carbridge_core::AdminRole;
use carbridge_reconcile::auth::{TokenClaims, mint};
use carbridge_reconcile::notify::TracingNotifier;
use carbridge_reconcile::{MemoryStore, Reconciler, SecretRing, TokenVerifier};
use carbridge_server::{app, middleware::REQUEST_ID_HEADER, state::AppState};

const SECRET: &str = "kq8Zr2vLx9TmP4wN7bYc3HfJ6sDg1AeU";
const VEHICLE: &str = "64f1c2a9e4b0a1b2c3d4e5a1";
const OWNER: &str = "64f1c2a9e4b0a1b2c3d4e5c1";
const INQUIRY: &str = "64f1c2a9e4b0a1b2c3d4e5d1";

async fn test_app() -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .seed("CarListing", [json!({
            "_id": { "$oid": VEHICLE },
            "make": "Toyota",
            "model": "Land Cruiser",
            "year": 1998,
            "customerId": OWNER,
            "timeline": [{ "title": "Deposit Paid", "type": "payment", "completed": true }]
        })])
        .await;
    store
        .seed("users", [json!({ "_id": { "$oid": OWNER }, "email": "owner@example.com", "name": "Olu Owner" })])
        .await;
    store
        .seed("inquiries", [json!({
            "_id": { "$oid": INQUIRY },
            "userId": OWNER,
            "message": "When does it ship?",
            "carDetailsSnapshot": { "carMake": "Toyota", "carModel": "Land Cruiser" }
        })])
        .await;

    let ring = SecretRing::new(Some(SecretString::from(SECRET)), Vec::new(), false);
    let reconciler = Reconciler::new(
        store.clone(),
        TokenVerifier::new(ring, 0),
        Arc::new(TracingNotifier),
        false,
    );
    (app(AppState::new(reconciler)), store)
}

fn admin_token(role: AdminRole) -> String {
    let claims = TokenClaims::admin("admin-1", role, chrono::Duration::hours(1));
    mint(&claims, &SecretString::from(SECRET)).unwrap()
}

fn customer_token(subject: &str) -> String {
    let claims = TokenClaims::customer(subject, chrono::Duration::hours(1));
    mint(&claims, &SecretString::from(SECRET)).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_and_request_id() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn test_admin_vehicle_lookup_reports_source() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(get(&format!("/api/admin/vehicles/{VEHICLE}"), &admin_token(AdminRole::Staff)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sourceCollection"], json!("CarListing"));
    assert_eq!(body["make"], json!("Toyota"));
    assert_eq!(body["timeline"][0]["title"], json!("Deposit Paid"));
    assert_eq!(body["timeline"][0]["type"], json!("payment"));
}

#[tokio::test]
async fn test_source_hint_is_checked_not_obeyed() {
    let (app, _) = test_app().await;
    let token = admin_token(AdminRole::Staff);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/admin/vehicles/{VEHICLE}?source=agreedvehicles"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["sourceCollection"], json!("CarListing"));

    let response = app
        .oneshot(get(&format!("/api/admin/vehicles/{VEHICLE}?source=orders"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        json!("unknown vehicle collection: orders")
    );
}

#[tokio::test]
async fn test_missing_and_wrong_kind_tokens() {
    let (app, _) = test_app().await;
    let uri = format!("/api/admin/vehicles/{VEHICLE}");

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get(&uri, &customer_token(OWNER))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_cookie_is_accepted() {
    let (app, _) = test_app().await;
    let request = Request::builder()
        .uri(format!("/api/admin/vehicles/{VEHICLE}"))
        .header(
            header::COOKIE,
            format!("theme=dark; adminToken={}", admin_token(AdminRole::Manager)),
        )
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_shipping_update_then_portal_view() {
    let (app, store) = test_app().await;
    let token = admin_token(AdminRole::Manager);
    let uri = format!("/api/admin/vehicles/{VEHICLE}/shipping");
    let body = json!({ "status": "Shipped", "carrier": "MSC", "trackingNumber": "MSCU1234567" });

    for _ in 0..2 {
        let response = app.clone().oneshot(post_json(&uri, &token, &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = body_json(response).await;
        assert_eq!(outcome["projectionUpdated"], json!(true));
    }
    assert_eq!(store.count("shippingrecords").await, 2);

    let response = app
        .clone()
        .oneshot(get(
            &format!("/api/portal/vehicles/{VEHICLE}/shipping"),
            &customer_token(OWNER),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["shipping"]["status"], json!("Shipped"));
    assert_eq!(view["timeline"].as_array().unwrap().len(), 1);

    // Another customer sees nothing
    let response = app
        .oneshot(get(
            &format!("/api/portal/vehicles/{VEHICLE}/shipping"),
            &customer_token("someone-else"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_portal_owner_match_ignores_id_shape() {
    let (app, store) = test_app().await;
    let other = "64f1c2a9e4b0a1b2c3d4e5a9";
    store
        .seed("vehicles", [json!({
            "_id": other,
            "make": "Honda",
            "customerId": { "$oid": OWNER.to_uppercase() }
        })])
        .await;

    let response = app
        .oneshot(get(
            &format!("/api/portal/vehicles/{other}/shipping"),
            &customer_token(&OWNER.to_uppercase()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["shipping"], json!(null));
}

#[tokio::test]
async fn test_unknown_vehicle_shipping_update_is_404() {
    let (app, store) = test_app().await;
    let response = app
        .oneshot(post_json(
            "/api/admin/vehicles/does-not-exist/shipping",
            &admin_token(AdminRole::Admin),
            &json!({ "status": "Shipped" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.count("shippingrecords").await, 0);
}

#[tokio::test]
async fn test_rebuild_requires_admin_role() {
    let (app, _) = test_app().await;
    let uri = format!("/api/admin/vehicles/{VEHICLE}/shipping/rebuild");

    let response = app
        .clone()
        .oneshot(post_json(&uri, &admin_token(AdminRole::Staff), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(post_json(&uri, &admin_token(AdminRole::SuperAdmin), &json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["records"], json!(0));
}

#[tokio::test]
async fn test_customer_lookup_by_email_fallback() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(get(
            "/api/admin/customers/unknown-id?email=OWNER@example.com",
            &admin_token(AdminRole::Staff),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sourceCollection"], json!("users"));
    assert_eq!(body["firstName"], json!("Olu"));
}

#[tokio::test]
async fn test_inquiry_reply() {
    let (app, store) = test_app().await;
    let token = admin_token(AdminRole::Manager);
    let uri = format!("/api/admin/inquiries/{INQUIRY}/replies");

    let response = app
        .clone()
        .oneshot(post_json(&uri, &token, &json!({ "message": "Loading next week" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["customerSource"], json!("users"));
    assert_eq!(outcome["customer"]["email"], json!("owner@example.com"));
    assert_eq!(outcome["notified"], json!(true));

    let inquiry = store.documents("inquiries").await.into_iter().next().unwrap();
    assert_eq!(inquiry["replies"][0]["authorRole"], json!("manager"));

    let response = app
        .oneshot(post_json(&uri, &token, &json!({ "message": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
