use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use sendstack_api::{
    app_router,
    config::AppConfig,
    db::{establish_connection_from_app_config, run_migrations},
    AppState,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// In-process application over an in-memory SQLite store. One connection
/// only, so every request sees the same database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn spawn_app() -> TestApp {
    let mut config = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        0,
        "test".to_string(),
    );
    config.payment_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
    config.db_max_connections = 1;
    config.db_min_connections = 1;

    let db = establish_connection_from_app_config(&config)
        .await
        .expect("test database should connect");
    run_migrations(&db).await.expect("migrations should apply");

    let state = AppState::new(Arc::new(db), Arc::new(config), None);
    let router = app_router(state.clone());

    TestApp { router, state }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    /// Posts a payment-gateway event with a valid HMAC signature.
    pub async fn post_webhook(&self, event: &Value) -> (StatusCode, Value) {
        let body = event.to_string();
        let ts = chrono::Utc::now().timestamp();
        let sig = sign_payload(TEST_WEBHOOK_SECRET, ts, body.as_bytes());
        self.post_webhook_raw(&body, &ts.to_string(), &sig).await
    }

    pub async fn post_webhook_raw(
        &self,
        body: &str,
        timestamp: &str,
        signature: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-timestamp", timestamp)
            .header("x-signature", signature)
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should answer");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn checkout_event(event_id: &str, session_id: &str, workspace_id: Uuid, quantity: u32) -> Value {
    checkout_event_with_skus(event_id, session_id, workspace_id, quantity, "inbox_purchase")
}

pub fn checkout_event_with_skus(
    event_id: &str,
    session_id: &str,
    workspace_id: Uuid,
    quantity: u32,
    skus: &str,
) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.completed",
        "data": { "object": {
            "id": session_id,
            "customer": "cus_test_1",
            "customer_email": "buyer@example.com",
            "customer_name": "Test Buyer",
            "currency": "usd",
            "metadata": {
                "workspace_id": workspace_id.to_string(),
                "quantity": quantity.to_string(),
                "purchase_kind": "inbox_purchase",
                "skus": skus
            }
        }}
    })
}

pub fn payment_event(event_id: &str, kind: &str, session_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": kind,
        "data": { "object": { "checkout_session_id": session_id } }
    })
}
