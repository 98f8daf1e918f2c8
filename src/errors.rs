use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Order 550e8400-e29b-41d4-a716-446655440000 not found",
    "timestamp": "2026-08-25T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Error taxonomy for the fulfillment engine.
///
/// The classification drives webhook retry behavior: rejected input maps
/// to 4xx (never redelivered), invariant violations map to 409 so callers
/// can tell them apart from benign no-ops, and transient infrastructure
/// failures map to 5xx so the payment gateway redelivers the event.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Illegal status transition: {0}")]
    IllegalTransition(String),

    #[error("Onboarding record is frozen: {0}")]
    OnboardingFrozen(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::BadRequest(_) | Self::InvalidWebhookSignature => {
                StatusCode::BAD_REQUEST
            }
            Self::IllegalTransition(_) | Self::OnboardingFrozen(_) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {}", msg),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_signal_retry() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::ServiceUnavailable("provisioner timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rejected_input_never_retries() {
        assert_eq!(
            ServiceError::InvalidWebhookSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ValidationError("missing field".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn invariant_violations_are_conflicts() {
        assert_eq!(
            ServiceError::IllegalTransition("cancelled -> delivered".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::OnboardingFrozen("order x".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = ServiceError::DatabaseError(DbErr::Custom("secret dsn".into()));
        assert_eq!(err.response_message(), "Database error");
    }
}
