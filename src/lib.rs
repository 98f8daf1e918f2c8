use std::sync::Arc;

use axum::{routing::get, routing::post, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use utoipa::ToSchema;

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use config::AppConfig;
use db::DbPool;
use events::EventSender;
use services::{
    fulfillment::FulfillmentService, idempotency::IdempotencyLedger,
    onboarding::OnboardingService, order_lifecycle::OrderLifecycleService, orders::OrderService,
};

/// Service layer shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub lifecycle: OrderLifecycleService,
    pub onboarding: OnboardingService,
    pub fulfillment: FulfillmentService,
    pub ledger: IdempotencyLedger,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: Option<EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, event_sender: Option<EventSender>) -> Self {
        let services = AppServices {
            orders: OrderService::new(
                db.clone(),
                event_sender.clone(),
                config.inbox_unit_price_cents,
            ),
            lifecycle: OrderLifecycleService::new(db.clone(), event_sender.clone()),
            onboarding: OnboardingService::new(db.clone(), event_sender.clone()),
            fulfillment: FulfillmentService::new(db.clone(), event_sender.clone()),
            ledger: IdempotencyLedger::new(db.clone()),
        };

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Standard envelope for successful responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route("/onboarding", post(handlers::onboarding::save_onboarding))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/fulfill",
            post(handlers::fulfillment::fulfill_order),
        )
        .route(
            "/orders/by-session/:session_id",
            get(handlers::orders::get_order_by_session),
        )
}

/// Builds the application router with tracing and the OpenAPI document.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn api_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, errors::ServiceError> {
    let db_healthy = db::check_connection(&state.db).await.is_ok();
    Ok(Json(ApiResponse::success(serde_json::json!({
        "status": if db_healthy { "ok" } else { "degraded" },
        "database": db_healthy,
        "environment": state.config.environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))))
}
