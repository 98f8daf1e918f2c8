use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::fulfillment::{FulfillmentOutcome, FulfillmentRequest},
    ApiResponse, AppState,
};

// POST /api/v1/orders/:id/fulfill
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/fulfill",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = FulfillmentRequest,
    responses(
        (status = 200, description = "Provisioned resources, or a no-op for an already delivered order"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cancelled or modified concurrently", body = crate::errors::ErrorResponse),
        (status = 503, description = "Fulfillment timed out; safe to retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Fulfillment"
)]
#[instrument(skip(state, request), fields(order_id = %order_id))]
pub async fn fulfill_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<FulfillmentRequest>,
) -> Result<Json<ApiResponse<FulfillmentOutcome>>, ServiceError> {
    let budget = Duration::from_secs(state.config.fulfillment_timeout_secs);

    // The transaction either committed in time or rolls back when the
    // dropped future releases its connection; a retry is always safe.
    let outcome = match tokio::time::timeout(
        budget,
        state.services.fulfillment.fulfill(order_id, request),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            warn!(%order_id, timeout_secs = budget.as_secs(), "fulfillment timed out");
            return Err(ServiceError::ServiceUnavailable(format!(
                "fulfillment did not complete within {}s",
                budget.as_secs()
            )));
        }
    };

    Ok(Json(ApiResponse::success(outcome)))
}
