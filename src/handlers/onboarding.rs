use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::onboarding::Model as OnboardingModel,
    errors::ServiceError,
    services::onboarding::{OnboardingSave, OrderRef},
    ApiResponse, AppState,
};

/// One save from the onboarding interview. The order is addressed by
/// internal id or by the checkout session the UI got from the payment
/// redirect; exactly one must be present.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OnboardingSaveRequest {
    pub order_id: Option<Uuid>,
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub payload: OnboardingSave,
}

impl OnboardingSaveRequest {
    fn order_ref(&self) -> Result<OrderRef, ServiceError> {
        match (self.order_id, &self.session_id) {
            (Some(id), None) => Ok(OrderRef::Id(id)),
            (None, Some(session)) => Ok(OrderRef::CheckoutSession(session.clone())),
            _ => Err(ServiceError::BadRequest(
                "exactly one of order_id or session_id must be provided".to_string(),
            )),
        }
    }
}

// POST /api/v1/onboarding
#[utoipa::path(
    post,
    path = "/api/v1/onboarding",
    request_body = OnboardingSaveRequest,
    responses(
        (status = 200, description = "Merged onboarding record"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Onboarding already completed", body = crate::errors::ErrorResponse)
    ),
    tag = "Onboarding"
)]
#[instrument(skip(state, request))]
pub async fn save_onboarding(
    State(state): State<AppState>,
    Json(request): Json<OnboardingSaveRequest>,
) -> Result<Json<ApiResponse<OnboardingModel>>, ServiceError> {
    let order_ref = request.order_ref()?;
    let record = state
        .services
        .onboarding
        .save(order_ref, request.payload)
        .await?;
    Ok(Json(ApiResponse::success(record)))
}
