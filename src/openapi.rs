use axum::Json;
use utoipa::OpenApi;

use crate::{
    errors::ErrorResponse,
    handlers::{
        onboarding::OnboardingSaveRequest,
        payment_webhooks::{IngestOutcome, IngestReceipt},
    },
    services::{
        fulfillment::{DomainSpec, FulfillmentRequest, InboxSpec},
        onboarding::{OnboardingSave, PersonaDefinition},
    },
};

/// OpenAPI document for the order lifecycle and fulfillment API.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::onboarding::save_onboarding,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_session,
        crate::handlers::fulfillment::fulfill_order,
    ),
    components(schemas(
        ErrorResponse,
        IngestOutcome,
        IngestReceipt,
        OnboardingSaveRequest,
        OnboardingSave,
        PersonaDefinition,
        FulfillmentRequest,
        DomainSpec,
        InboxSpec,
    )),
    tags(
        (name = "Payments", description = "Payment-gateway webhook ingestion"),
        (name = "Onboarding", description = "Buyer onboarding interview"),
        (name = "Orders", description = "Order lookup"),
        (name = "Fulfillment", description = "Resource provisioning")
    ),
    info(
        title = "SendStack API",
        description = "Order lifecycle and fulfillment engine for cold-email inbox provisioning"
    )
)]
pub struct ApiDoc;

// GET /api-docs/openapi.json
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
