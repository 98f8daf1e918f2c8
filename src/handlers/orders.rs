use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{onboarding::Model as OnboardingModel, order::Model as OrderModel},
    errors::ServiceError,
    ApiResponse, AppState,
};

/// An order together with its onboarding record, the shape the operator
/// dashboard and the buyer-facing status page both read.
#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: OrderModel,
    pub onboarding: Option<OnboardingModel>,
}

// GET /api/v1/orders/:id
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with onboarding state"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let onboarding = state.services.onboarding.get_for_order(order.id).await?;

    Ok(Json(ApiResponse::success(OrderView { order, onboarding })))
}

// GET /api/v1/orders/by-session/:session_id
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-session/{session_id}",
    params(("session_id" = String, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Order with onboarding state"),
        (status = 404, description = "No order for this session", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
#[instrument(skip(state))]
pub async fn get_order_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let order = state
        .services
        .orders
        .find_by_checkout_session(&session_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No order for checkout session {}", session_id))
        })?;

    let onboarding = state.services.onboarding.get_for_order(order.id).await?;

    Ok(Json(ApiResponse::success(OrderView { order, onboarding })))
}
