use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use hmac::{Hmac, Mac};
use pharmalink_dispatch::api::rest::auth::sign_token;
use pharmalink_dispatch::api::rest::router;
use pharmalink_dispatch::config::Config;
use pharmalink_dispatch::models::actor::Role;
use pharmalink_dispatch::notify::{order_channel, GLOBAL_CHANNEL};
use pharmalink_dispatch::state::AppState;
use serde_json::{json, Value};
use sha2::Sha512;
use tower::ServiceExt;

const JWT_SECRET: &str = "jwt-test-secret";
const WEBHOOK_SECRET: &str = "sk_test_webhook";
const PHARMACY: &str = "PHARM-SANDTON";
const GOOD_HASH: &str = "sha256_mock_recipient_biometric_data_verified_zar";

fn setup() -> (axum::Router, Arc<AppState>) {
    let config = Config::for_secrets(JWT_SECRET, WEBHOOK_SECRET);
    let state = Arc::new(AppState::new(&config).unwrap());
    (router(state.clone()), state)
}

fn token(user_id: &str, role: Role, pharmacy_id: Option<&str>) -> String {
    sign_token(JWT_SECRET, user_id, role, pharmacy_id, Duration::hours(1)).unwrap()
}

fn doctor() -> String {
    token("DOC-1", Role::Doctor, None)
}

fn pharmacist() -> String {
    token("PHA-1", Role::Pharmacist, Some(PHARMACY))
}

fn driver() -> String {
    token("DRV-772", Role::Driver, None)
}

fn authed(method: &str, uri: &str, bearer: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {bearer}"))
        .header("x-forwarded-for", "41.13.0.9");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn sign_webhook(payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn webhook_request(payload: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-paystack-signature", signature);
    }
    builder.body(Body::from(payload.to_vec())).unwrap()
}

fn charge_success(order_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": { "amount": 8500, "reference": "T-991", "metadata": { "order_id": order_id } }
    }))
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn issue(app: &axum::Router, price: f64) -> String {
    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/prescriptions",
            &doctor(),
            Some(json!({
                "pharmacy_id": PHARMACY,
                "patient_id": "PAT-001",
                "medications": [{ "name": "Insulin Glargine", "quantity": 1, "price": price }],
                "is_refrigerated": true
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending_verification");
    body["id"].as_str().unwrap().to_string()
}

async fn pay(app: &axum::Router, order_id: &str) -> Value {
    let payload = charge_success(order_id);
    let signature = sign_webhook(&payload);
    let response = app
        .clone()
        .oneshot(webhook_request(&payload, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Issues, pays, accepts and dispatches an order; returns (order_id, delivery_id).
async fn dispatched(app: &axum::Router, price: f64) -> (String, String) {
    let order_id = issue(app, price).await;
    pay(app, &order_id).await;

    let response = app
        .clone()
        .oneshot(authed("PATCH", &format!("/orders/{order_id}/accept"), &pharmacist(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/orders/{order_id}/assign-driver"),
            &pharmacist(),
            Some(json!({ "driver_id": "DRV-772" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "out_for_delivery");
    assert_eq!(body["delivery"]["status"], "assigned");
    (order_id, body["delivery"]["id"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["deliveries"], 0);
    assert_eq!(body["connections"], 0);
    assert!(body["server_time"].is_string());
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;
    pay(&app, &order_id).await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("transitions_total"));
    assert!(body.contains("adapter_calls_total"));
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let (app, _state) = setup();

    let response = app.clone().oneshot(get_request("/orders")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthenticated");

    let forged = sign_token("other-secret", "PHA-1", Role::Pharmacist, Some(PHARMACY), Duration::hours(1))
        .unwrap();
    let response = app
        .oneshot(authed("GET", "/orders", &forged, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let (app, state) = setup();
    let order_id = issue(&app, 2000.0).await;

    let paid = pay(&app, &order_id).await;
    assert_eq!(paid["outcome"], "confirmed");
    assert_eq!(paid["order"]["status"], "paid");
    assert_eq!(paid["order"]["amount_paid"], 85.0);

    let (conn, mut rx) = state.fanout.connect();
    state
        .fanout
        .join(conn, &order_channel(order_id.parse().unwrap()))
        .unwrap();

    let response = app
        .clone()
        .oneshot(authed("PATCH", &format!("/orders/{order_id}/accept"), &pharmacist(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "processing");
    assert_eq!(rx.recv().await.unwrap().message, "Your pharmacist is preparing your medication.");

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/orders/{order_id}/assign-driver"),
            &pharmacist(),
            Some(json!({ "driver_id": "DRV-772" })),
        ))
        .await
        .unwrap();
    let delivery_id = body_json(response).await["delivery"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(authed("GET", "/deliveries/mine", &driver(), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            &driver(),
            Some(json!({
                "status": "in_transit",
                "temperature": 4.2,
                "location": { "lat": -26.1076, "lng": 28.0567 }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["order_status"], "in_transit");
    assert_eq!(body["condition"], "NOMINAL");

    let response = app
        .clone()
        .oneshot(authed(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            &driver(),
            Some(json!({ "status": "CRITICAL", "temperature": 9.5 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["condition"], "CRITICAL");
    assert_eq!(body["delivery"]["status"], "in_transit");

    let response = app
        .clone()
        .oneshot(authed("GET", &format!("/deliveries/{delivery_id}"), &pharmacist(), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["delivery"]["temperature_max"], 9.5);
    assert_eq!(body["alerts"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/deliveries/{delivery_id}/verify-biometric"),
            &driver(),
            Some(json!({ "biometric_hash": GOOD_HASH })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["order"]["status"], "delivered");
    assert_eq!(body["delivery"]["status"], "delivered");
    assert_eq!(body["audit_hash"].as_str().unwrap().len(), 64);

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/orders/{order_id}/claims"),
            &pharmacist(),
            Some(json!({ "scheme": "GEMS" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["action"], "FULLY_COVERED");
    assert_eq!(body["claim"]["status"], "approved");
    assert!(body["claim"]["auth_number"].as_str().unwrap().starts_with("AUTH-"));

    let response = app
        .oneshot(authed(
            "POST",
            &format!("/orders/{order_id}/claims"),
            &pharmacist(),
            Some(json!({ "scheme": "GEMS" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn webhook_rejects_bad_or_missing_signature() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;
    let payload = charge_success(&order_id);

    let response = app
        .clone()
        .oneshot(webhook_request(&payload, Some("deadbeef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_signature");

    let response = app
        .clone()
        .oneshot(webhook_request(&payload, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(authed("GET", &format!("/orders/{order_id}"), &doctor(), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "pending_verification");
}

#[tokio::test]
async fn webhook_ignores_other_events_and_rejects_replays() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;

    let payload = serde_json::to_vec(&json!({
        "event": "transfer.failed",
        "data": { "amount": 100, "metadata": { "order_id": order_id } }
    }))
    .unwrap();
    let response = app
        .clone()
        .oneshot(webhook_request(&payload, Some(&sign_webhook(&payload))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "ignored");

    pay(&app, &order_id).await;
    let payload = charge_success(&order_id);
    let response = app
        .oneshot(webhook_request(&payload, Some(&sign_webhook(&payload))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;
    pay(&app, &order_id).await;

    let response = app
        .oneshot(authed("PATCH", &format!("/orders/{order_id}/accept"), &driver(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn other_pharmacy_cannot_accept() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;
    pay(&app, &order_id).await;

    let outsider = token("PHA-9", Role::Pharmacist, Some("PHARM-DURBAN"));
    let response = app
        .oneshot(authed("PATCH", &format!("/orders/{order_id}/accept"), &outsider, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn biometric_mismatch_keeps_order_in_transit() {
    let (app, _state) = setup();
    let (order_id, delivery_id) = dispatched(&app, 100.0).await;

    app.clone()
        .oneshot(authed(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            &driver(),
            Some(json!({ "status": "in_transit" })),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            &format!("/deliveries/{delivery_id}/verify-biometric"),
            &driver(),
            Some(json!({ "biometric_hash": "short" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], "biometric_mismatch");

    let response = app
        .oneshot(authed("GET", &format!("/orders/{order_id}"), &pharmacist(), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "in_transit");
}

#[tokio::test]
async fn partial_location_is_dropped() {
    let (app, _state) = setup();
    let (_order_id, delivery_id) = dispatched(&app, 100.0).await;

    let response = app
        .clone()
        .oneshot(authed(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            &driver(),
            Some(json!({ "status": "in_transit", "location": { "lat": -26.1 } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["location"].is_null());
    assert!(body["delivery"]["last_location"].is_null());
}

#[tokio::test]
async fn another_driver_cannot_update_delivery() {
    let (app, _state) = setup();
    let (_order_id, delivery_id) = dispatched(&app, 100.0).await;

    let other = token("DRV-001", Role::Driver, None);
    let response = app
        .oneshot(authed(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            &other,
            Some(json!({ "status": "in_transit" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pended_claim_requires_co_payment() {
    let (app, _state) = setup();
    let (order_id, _delivery_id) = dispatched(&app, 5000.0).await;

    let response = app
        .oneshot(authed(
            "POST",
            &format!("/orders/{order_id}/claims"),
            &pharmacist(),
            Some(json!({ "scheme": "Bonitas" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["claim"]["status"], "pended");
    assert_eq!(body["claim"]["medical_aid_paid"], 4250.0);
    assert_eq!(body["action"], "CO_PAYMENT_REQUIRED");
}

#[tokio::test]
async fn adjudication_preview_and_identity_check() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/claims/adjudicate",
            &pharmacist(),
            Some(json!({ "scheme": "GEMS", "items": [{ "name": "Amoxicillin", "price": 150.0 }] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["transactionId"].as_str().unwrap().starts_with("EDI-"));
    assert_eq!(body["summary"]["patientCoPayment"], 0.0);

    let response = app
        .oneshot(authed(
            "POST",
            "/identity/verify",
            &pharmacist(),
            Some(json!({ "id_number": "8001015009087" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn global_subscribers_see_every_order() {
    let (app, state) = setup();
    let (conn, mut rx) = state.fanout.connect();
    state.fanout.join(conn, GLOBAL_CHANNEL).unwrap();

    let first = issue(&app, 100.0).await;
    let second = issue(&app, 200.0).await;

    assert_eq!(rx.recv().await.unwrap().order_id.to_string(), first);
    assert_eq!(rx.recv().await.unwrap().order_id.to_string(), second);
    assert_eq!(state.fanout.subscriber_count(GLOBAL_CHANNEL), 1);
}

#[tokio::test]
async fn webhook_acknowledges_events_without_amount() {
    let (app, _state) = setup();
    let payload = br#"{"event":"subscription.create","data":{"subscription_code":"SUB_x"}}"#;

    let response = app
        .oneshot(webhook_request(payload, Some(&sign_webhook(payload))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["event"], "subscription.create");
}

#[tokio::test]
async fn websocket_upgrade_requires_bearer_token() {
    let (app, _state) = setup();

    let response = app.clone().oneshot(get_request("/ws")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(get_request("/ws?token=not-a-jwt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pharmacist_manages_own_inventory() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/inventory",
            &pharmacist(),
            Some(json!({ "name": "Insulin Glargine", "quantity": 12, "is_refrigerated": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let item_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let outsider = token("PHA-9", Role::Pharmacist, Some("PHARM-DURBAN"));
    let response = app
        .clone()
        .oneshot(authed(
            "PATCH",
            &format!("/inventory/{item_id}"),
            &outsider,
            Some(json!({ "quantity": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(authed(
            "PATCH",
            &format!("/inventory/{item_id}"),
            &pharmacist(),
            Some(json!({ "quantity": 30 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["quantity"], 30);

    let response = app
        .oneshot(authed("GET", "/inventory", &pharmacist(), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Insulin Glargine");
}

#[tokio::test]
async fn patient_lists_own_orders() {
    let (app, _state) = setup();
    let order_id = issue(&app, 100.0).await;

    let patient = token("PAT-001", Role::Patient, None);
    let response = app
        .clone()
        .oneshot(authed("GET", "/orders", &patient, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], order_id.as_str());

    let stranger = token("PAT-999", Role::Patient, None);
    let response = app
        .oneshot(authed("GET", "/orders", &stranger, None))
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn identity_check_is_refused_for_drivers() {
    let (app, _state) = setup();

    let response = app
        .oneshot(authed(
            "POST",
            "/identity/verify",
            &driver(),
            Some(json!({ "id_number": "8001015009087" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
