//! Callback receiver behaviour through the HTTP router

mod common;

use axum::body::{to_bytes, Body};
use axum::Router;
use bigdecimal::BigDecimal;
use club_payments::payments::types::PaymentStatus;
use club_payments::services::notification::NotificationType;
use common::*;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

const CALLBACK_PATH: &str = "/api/payments/mpesa/callback";
const UNUSED_GATEWAY: &str = "http://127.0.0.1:9";

fn pending_store() -> Arc<InMemoryStore> {
    Arc::new(
        InMemoryStore::new()
            .with_config(provider_config())
            .with_request(payment_request(PaymentStatus::Pending, Some(CHECKOUT_REQUEST_ID))),
    )
}

fn success_callback() -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": MERCHANT_REQUEST_ID,
                "CheckoutRequestID": CHECKOUT_REQUEST_ID,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 200.00},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "TransactionDate", "Value": 20261018102115u64},
                        {"Name": "PhoneNumber", "Value": 254712345678u64}
                    ]
                }
            }
        }
    })
}

fn cancelled_callback() -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": MERCHANT_REQUEST_ID,
                "CheckoutRequestID": CHECKOUT_REQUEST_ID,
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    })
}

async fn post_raw(app: &Router, body: impl Into<Body>) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(CALLBACK_PATH)
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn post_json(app: &Router, payload: &Value) -> (StatusCode, String) {
    post_raw(app, payload.to_string()).await
}

#[tokio::test]
async fn success_callback_settles_payment_request() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (status, body) = post_json(&app, &success_callback()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(
        store.request(PAYMENT_REQUEST_ID).unwrap().status,
        PaymentStatus::Completed
    );

    let records = store.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.mpesa_receipt_number, "NLJ7RT61SV");
    assert_eq!(record.phone_number, "254712345678");
    assert_eq!(record.amount, BigDecimal::from(200));
    assert_eq!(record.user_id, USER_ID);
    assert_eq!(record.payment_type, "membership_fee");
    assert_eq!(record.checkout_request_id, CHECKOUT_REQUEST_ID);
    assert_eq!(record.status, PaymentStatus::Completed);

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, USER_ID);
    assert_eq!(notifications[0].title, "Payment Successful");
    assert_eq!(notifications[0].notification_type, NotificationType::Success);
}

#[tokio::test]
async fn failure_callback_marks_request_failed_without_record() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (status, body) = post_json(&app, &cancelled_callback()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    let request = store.request(PAYMENT_REQUEST_ID).unwrap();
    assert_eq!(request.status, PaymentStatus::Failed);
    assert_eq!(request.result_code, Some(1032));
    assert_eq!(request.result_desc.as_deref(), Some("Request cancelled by user"));
    assert!(store.records().is_empty());

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].message, "Request cancelled by user");
    assert_eq!(notifications[0].notification_type, NotificationType::Error);
}

#[tokio::test]
async fn duplicate_success_callback_writes_once() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (first, _) = post_json(&app, &success_callback()).await;
    let (second, body) = post_json(&app, &success_callback()).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(store.records().len(), 1);
    assert_eq!(store.notifications().len(), 1);
}

#[tokio::test]
async fn late_failure_does_not_undo_completion() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    post_json(&app, &success_callback()).await;
    let (status, _) = post_json(&app, &cancelled_callback()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        store.request(PAYMENT_REQUEST_ID).unwrap().status,
        PaymentStatus::Completed
    );
    assert_eq!(store.notifications().len(), 1);
}

#[tokio::test]
async fn success_after_failure_is_acknowledged_without_writes() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    post_json(&app, &cancelled_callback()).await;
    let (status, body) = post_json(&app, &success_callback()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    let request = store.request(PAYMENT_REQUEST_ID).unwrap();
    assert_eq!(request.status, PaymentStatus::Failed);
    assert_eq!(request.result_code, Some(1032));
    assert!(store.records().is_empty());
    assert_eq!(store.notifications().len(), 1);
}

#[tokio::test]
async fn unknown_checkout_request_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (status, _) = post_json(&app, &success_callback()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(store.records().is_empty());
    assert!(store.notifications().is_empty());
}

#[tokio::test]
async fn success_without_receipt_fails_and_nothing_written() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let mut payload = success_callback();
    payload["Body"]["stkCallback"]["CallbackMetadata"]["Item"] = json!([
        {"Name": "Amount", "Value": 200},
        {"Name": "PhoneNumber", "Value": 254712345678u64}
    ]);
    let (status, body) = post_json(&app, &payload).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("MpesaReceiptNumber"));
    assert_eq!(
        store.request(PAYMENT_REQUEST_ID).unwrap().status,
        PaymentStatus::Pending
    );
    assert!(store.records().is_empty());
    assert!(store.notifications().is_empty());
}

#[tokio::test]
async fn non_post_is_rejected() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(CALLBACK_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Method not allowed");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let store = pending_store();
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (empty, _) = post_raw(&app, "").await;
    let (garbage, _) = post_raw(&app, "{not json").await;
    let (no_callback, _) = post_json(&app, &json!({"Body": {}})).await;

    assert_eq!(empty, StatusCode::BAD_REQUEST);
    assert_eq!(garbage, StatusCode::BAD_REQUEST);
    assert_eq!(no_callback, StatusCode::BAD_REQUEST);
    assert!(store.notifications().is_empty());
}

#[tokio::test]
async fn storage_failure_is_a_server_error() {
    let store = Arc::new(
        InMemoryStore::new()
            .with_request(payment_request(PaymentStatus::Pending, Some(CHECKOUT_REQUEST_ID)))
            .failing_writes(),
    );
    let app = test_router(store.clone(), UNUSED_GATEWAY);

    let (status, body) = post_json(&app, &success_callback()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("connection reset"));
    assert_eq!(
        store.request(PAYMENT_REQUEST_ID).unwrap().status,
        PaymentStatus::Pending
    );
}
