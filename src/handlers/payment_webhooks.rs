use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{
        idempotency::MarkOutcome,
        order_lifecycle::OrderSignal,
        orders::CheckoutPurchase,
    },
    ApiResponse, AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// The only purchase kind this engine fulfills; anything else in checkout
/// metadata belongs to another product line and is ignored.
const INBOX_PURCHASE_KIND: &str = "inbox_purchase";

/// How one webhook delivery was resolved. Everything here answers 2xx so
/// the gateway stops redelivering; transient failures never reach this
/// enum and propagate as 5xx instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed,
    DuplicateIgnored,
    IgnoredEventType,
    IgnoredPurchaseKind,
    NoMatchingOrder,
    /// Permanently unprocessable (bad metadata, late signal); logged, never
    /// retried.
    HandledFailure,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestReceipt {
    pub outcome: IngestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

/// Typed envelope of a gateway event.
#[derive(Debug, Deserialize)]
struct GatewayEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
struct GatewayEventData {
    object: Value,
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event handled or intentionally ignored"),
        (status = 400, description = "Invalid signature or malformed payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Transient failure; safe to redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<IngestReceipt>>, ServiceError> {
    if let Some(secret) = &state.config.payment_webhook_secret {
        if !verify_signature(
            &headers,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
        ) {
            warn!("payment webhook signature verification failed");
            return Err(ServiceError::InvalidWebhookSignature);
        }
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid event payload: {}", e)))?;

    // Mark first: the ledger write must survive whatever the handler
    // branch does afterwards.
    if state.services.ledger.mark_processed(&event.id).await? == MarkOutcome::AlreadyProcessed {
        info!(event_id = %event.id, "webhook event already processed");
        return Ok(Json(ApiResponse::success(IngestReceipt {
            outcome: IngestOutcome::DuplicateIgnored,
            order_id: None,
        })));
    }

    let receipt = match event.kind.as_str() {
        "checkout.completed" => handle_checkout_completed(&state, &event).await?,
        "payment.succeeded" => {
            handle_payment_signal(&state, &event, OrderSignal::PaymentConfirmed).await?
        }
        "payment.failed" => {
            handle_payment_signal(&state, &event, OrderSignal::PaymentFailed).await?
        }
        other => {
            info!(event_type = %other, "unhandled payment webhook type");
            IngestReceipt {
                outcome: IngestOutcome::IgnoredEventType,
                order_id: None,
            }
        }
    };

    Ok(Json(ApiResponse::success(receipt)))
}

async fn handle_checkout_completed(
    state: &AppState,
    event: &GatewayEvent,
) -> Result<IngestReceipt, ServiceError> {
    let object = &event.data.object;
    let metadata = object.get("metadata").cloned().unwrap_or(Value::Null);

    let purchase_kind = metadata.get("purchase_kind").and_then(Value::as_str);
    if purchase_kind != Some(INBOX_PURCHASE_KIND) {
        info!(event_id = %event.id, ?purchase_kind, "ignoring non-inbox purchase");
        return Ok(IngestReceipt {
            outcome: IngestOutcome::IgnoredPurchaseKind,
            order_id: None,
        });
    }

    let purchase = match extract_purchase(object, &metadata) {
        Ok(purchase) => purchase,
        Err(reason) => {
            // A malformed event will not improve on redelivery; record the
            // failure and acknowledge so the gateway stops retrying.
            warn!(event_id = %event.id, %reason, "checkout event missing required metadata");
            return Ok(IngestReceipt {
                outcome: IngestOutcome::HandledFailure,
                order_id: None,
            });
        }
    };

    match state.services.orders.create_from_checkout(purchase).await {
        Ok(order) => Ok(IngestReceipt {
            outcome: IngestOutcome::Processed,
            order_id: Some(order.id),
        }),
        // Session already has an order: the ledger missed (e.g. pruned
        // marks) but the unique session index held. Benign duplicate.
        Err(ServiceError::Conflict(msg)) => {
            info!(event_id = %event.id, %msg, "duplicate checkout session");
            Ok(IngestReceipt {
                outcome: IngestOutcome::DuplicateIgnored,
                order_id: None,
            })
        }
        Err(ServiceError::ValidationError(msg)) => {
            warn!(event_id = %event.id, %msg, "checkout event failed validation");
            Ok(IngestReceipt {
                outcome: IngestOutcome::HandledFailure,
                order_id: None,
            })
        }
        // Transient store failures must reach the gateway as 5xx so the
        // event is redelivered.
        Err(e) => Err(e),
    }
}

async fn handle_payment_signal(
    state: &AppState,
    event: &GatewayEvent,
    signal: OrderSignal,
) -> Result<IngestReceipt, ServiceError> {
    let object = &event.data.object;
    let session_id = object
        .get("checkout_session_id")
        .or_else(|| object.get("session_id"))
        .and_then(Value::as_str);

    let Some(session_id) = session_id else {
        warn!(event_id = %event.id, "payment event carries no checkout session id");
        return Ok(IngestReceipt {
            outcome: IngestOutcome::HandledFailure,
            order_id: None,
        });
    };

    // Sessions not tracked by this system, or events racing ahead of the
    // checkout commit, match nothing; a later redelivery reconciles.
    let Some(order) = state
        .services
        .orders
        .find_by_checkout_session(session_id)
        .await?
    else {
        info!(event_id = %event.id, session_id, "no matching order for payment event");
        return Ok(IngestReceipt {
            outcome: IngestOutcome::NoMatchingOrder,
            order_id: None,
        });
    };

    match state.services.lifecycle.transition(order.id, signal).await {
        Ok(order) => Ok(IngestReceipt {
            outcome: IngestOutcome::Processed,
            order_id: Some(order.id),
        }),
        // A late or out-of-order signal (payment.failed after delivery)
        // will never become valid; absorbing it avoids a retry storm.
        Err(ServiceError::IllegalTransition(msg)) | Err(ServiceError::Conflict(msg)) => {
            warn!(event_id = %event.id, order_id = %order.id, %msg, "payment signal not applicable");
            Ok(IngestReceipt {
                outcome: IngestOutcome::HandledFailure,
                order_id: Some(order.id),
            })
        }
        Err(e) => Err(e),
    }
}

fn extract_purchase(object: &Value, metadata: &Value) -> Result<CheckoutPurchase, String> {
    let session_id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or("missing checkout session id")?;

    let workspace_id = metadata
        .get("workspace_id")
        .and_then(Value::as_str)
        .ok_or("missing metadata.workspace_id")?;
    let workspace_id = Uuid::parse_str(workspace_id)
        .map_err(|_| format!("metadata.workspace_id '{}' is not a UUID", workspace_id))?;

    // Gateways serialize metadata values as strings; tolerate numbers too.
    let quantity = match metadata.get("quantity") {
        Some(Value::String(s)) => s.parse::<i32>().ok(),
        Some(Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        _ => None,
    }
    .ok_or("missing or non-numeric metadata.quantity")?;

    let external_customer_id = object
        .get("customer")
        .and_then(Value::as_str)
        .ok_or("missing customer reference")?
        .to_string();

    let skus = match metadata.get("skus").and_then(Value::as_str) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => vec![INBOX_PURCHASE_KIND.to_string()],
    };

    let currency = object
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("usd")
        .to_uppercase();

    Ok(CheckoutPurchase {
        checkout_session_id: session_id.to_string(),
        workspace_id,
        external_customer_id,
        customer_email: object
            .get("customer_email")
            .and_then(Value::as_str)
            .map(str::to_string),
        customer_name: object
            .get("customer_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        quantity,
        skus,
        currency,
    })
}

/// HMAC-SHA256 over "{timestamp}.{body}" with the shared secret, carried
/// in `x-timestamp` / `x-signature` headers. The timestamp bounds replay.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sign(secret: &str, ts: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn headers_for(ts: i64, sig: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&ts.to_string()).unwrap());
        headers.insert("x-signature", HeaderValue::from_str(sig).unwrap());
        headers
    }

    #[test]
    fn accepts_a_valid_signature() {
        let body = Bytes::from_static(b"{\"id\":\"evt_1\"}");
        let ts = chrono::Utc::now().timestamp();
        let sig = sign("whsec_test", ts, &body);
        assert!(verify_signature(&headers_for(ts, &sig), &body, "whsec_test", 300));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let body = Bytes::from_static(b"{\"id\":\"evt_1\"}");
        let ts = chrono::Utc::now().timestamp();
        let sig = sign("whsec_test", ts, b"{\"id\":\"evt_2\"}");
        assert!(!verify_signature(&headers_for(ts, &sig), &body, "whsec_test", 300));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let body = Bytes::from_static(b"{}");
        let ts = chrono::Utc::now().timestamp() - 3600;
        let sig = sign("whsec_test", ts, &body);
        assert!(!verify_signature(&headers_for(ts, &sig), &body, "whsec_test", 300));
    }

    #[test]
    fn rejects_missing_headers() {
        let body = Bytes::from_static(b"{}");
        assert!(!verify_signature(&HeaderMap::new(), &body, "whsec_test", 300));
    }

    #[test]
    fn extracts_a_complete_purchase() {
        let workspace = Uuid::new_v4();
        let object = serde_json::json!({
            "id": "cs_123",
            "customer": "cus_9",
            "customer_email": "buyer@example.com",
            "currency": "usd",
            "metadata": {
                "workspace_id": workspace.to_string(),
                "quantity": "5",
                "purchase_kind": "inbox_purchase",
                "skus": "inbox_purchase,inbox_subscription_monthly"
            }
        });
        let metadata = object.get("metadata").cloned().unwrap();

        let purchase = extract_purchase(&object, &metadata).unwrap();
        assert_eq!(purchase.checkout_session_id, "cs_123");
        assert_eq!(purchase.workspace_id, workspace);
        assert_eq!(purchase.quantity, 5);
        assert_eq!(purchase.currency, "USD");
        assert_eq!(
            purchase.skus,
            vec!["inbox_purchase", "inbox_subscription_monthly"]
        );
    }

    #[test]
    fn missing_metadata_is_reported() {
        let object = serde_json::json!({ "id": "cs_123", "customer": "cus_9" });
        let err = extract_purchase(&object, &Value::Null).unwrap_err();
        assert!(err.contains("workspace_id"));
    }

    #[test]
    fn numeric_quantity_is_tolerated() {
        let workspace = Uuid::new_v4();
        let object = serde_json::json!({
            "id": "cs_1",
            "customer": "cus_1",
            "metadata": { "workspace_id": workspace.to_string(), "quantity": 3 }
        });
        let metadata = object.get("metadata").cloned().unwrap();
        let purchase = extract_purchase(&object, &metadata).unwrap();
        assert_eq!(purchase.quantity, 3);
    }
}
