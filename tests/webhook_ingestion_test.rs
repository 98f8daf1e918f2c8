mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{checkout_event, payment_event, sign_payload, spawn_app};

#[tokio::test]
async fn checkout_event_creates_a_priced_order() {
    let app = spawn_app().await;
    let workspace = Uuid::new_v4();

    let (status, body) = app
        .post_webhook(&checkout_event("evt_1", "cs_100", workspace, 5))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "processed");
    let order_id = body["data"]["order_id"].as_str().expect("order id");

    let (status, body) = app.get(&format!("/api/v1/orders/{}", order_id)).await;
    assert_eq!(status, StatusCode::OK);
    let order = &body["data"];
    assert_eq!(order["status"], "placed");
    assert_eq!(order["inbox_count"], 5);
    // Mailboxes are batched three per domain.
    assert_eq!(order["domain_count"], 2);
    assert_eq!(order["total_amount_cents"], 5 * 3000);
    assert_eq!(order["currency"], "USD");
    assert_eq!(order["checkout_session_id"], "cs_100");
    // The onboarding scaffold is created with the order.
    assert_eq!(order["onboarding"]["step_completed"], 0);
    assert_eq!(order["onboarding"]["is_completed"], false);
}

#[tokio::test]
async fn redelivered_event_is_ignored() {
    let app = spawn_app().await;
    let event = checkout_event("evt_dup", "cs_200", Uuid::new_v4(), 2);

    let (status, body) = app.post_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "processed");

    let (status, body) = app.post_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "duplicate_ignored");
}

#[tokio::test]
async fn same_session_under_a_new_event_id_is_still_one_order() {
    let app = spawn_app().await;
    let workspace = Uuid::new_v4();

    let (_, first) = app
        .post_webhook(&checkout_event("evt_a", "cs_300", workspace, 1))
        .await;
    assert_eq!(first["data"]["outcome"], "processed");

    // Distinct event id defeats the ledger; the unique session index holds.
    let (status, second) = app
        .post_webhook(&checkout_event("evt_b", "cs_300", workspace, 1))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["outcome"], "duplicate_ignored");
}

#[tokio::test]
async fn payment_succeeded_moves_the_order_to_processing() {
    let app = spawn_app().await;
    app.post_webhook(&checkout_event("evt_1", "cs_400", Uuid::new_v4(), 1))
        .await;

    let (status, body) = app
        .post_webhook(&payment_event("evt_2", "payment.succeeded", "cs_400"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "processed");

    let (_, body) = app.get("/api/v1/orders/by-session/cs_400").await;
    assert_eq!(body["data"]["status"], "processing");
}

#[tokio::test]
async fn payment_failed_cancels_the_order() {
    let app = spawn_app().await;
    app.post_webhook(&checkout_event("evt_1", "cs_500", Uuid::new_v4(), 1))
        .await;
    app.post_webhook(&payment_event("evt_2", "payment.succeeded", "cs_500"))
        .await;

    let (status, body) = app
        .post_webhook(&payment_event("evt_3", "payment.failed", "cs_500"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "processed");

    let (_, body) = app.get("/api/v1/orders/by-session/cs_500").await;
    assert_eq!(body["data"]["status"], "cancelled");
}

#[tokio::test]
async fn payment_event_for_an_unknown_session_is_benign() {
    let app = spawn_app().await;

    let (status, body) = app
        .post_webhook(&payment_event("evt_1", "payment.failed", "cs_nobody"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "no_matching_order");
}

#[tokio::test]
async fn late_payment_failure_after_delivery_is_absorbed() {
    let app = spawn_app().await;
    app.post_webhook(&checkout_event("evt_1", "cs_600", Uuid::new_v4(), 1))
        .await;
    let (_, body) = app.get("/api/v1/orders/by-session/cs_600").await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json(
            &format!("/api/v1/orders/{}/fulfill", order_id),
            &json!({
                "domains": [{ "name": "acme-mail.com" }],
                "inboxes": [{ "address": "amy@acme-mail.com", "domain_ref": 0 }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The gateway delivers late; the failed transition is logged, not retried.
    let (status, body) = app
        .post_webhook(&payment_event("evt_2", "payment.failed", "cs_600"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "handled_failure");

    let (_, body) = app.get("/api/v1/orders/by-session/cs_600").await;
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let app = spawn_app().await;
    let event = checkout_event("evt_1", "cs_700", Uuid::new_v4(), 1);
    let body = event.to_string();
    let ts = chrono::Utc::now().timestamp();
    let sig = sign_payload("wrong-secret", ts, body.as_bytes());

    let (status, _) = app.post_webhook_raw(&body, &ts.to_string(), &sig).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was recorded for the forged session.
    let (status, _) = app.get("/api/v1/orders/by-session/cs_700").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_purchase_kinds_are_ignored() {
    let app = spawn_app().await;
    let mut event = checkout_event("evt_1", "cs_800", Uuid::new_v4(), 1);
    event["data"]["object"]["metadata"]["purchase_kind"] = json!("swag");

    let (status, body) = app.post_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "ignored_purchase_kind");

    let (status, _) = app.get("/api/v1/orders/by-session/cs_800").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_without_metadata_is_acknowledged_but_not_processed() {
    let app = spawn_app().await;
    let event = json!({
        "id": "evt_1",
        "type": "checkout.completed",
        "data": { "object": {
            "id": "cs_900",
            "customer": "cus_1",
            "metadata": { "purchase_kind": "inbox_purchase" }
        }}
    });

    let (status, body) = app.post_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "handled_failure");
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let app = spawn_app().await;
    let event = json!({
        "id": "evt_1",
        "type": "customer.updated",
        "data": { "object": {} }
    });

    let (status, body) = app.post_webhook(&event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "ignored_event_type");
}
