use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        client::{
            ActiveModel as ClientActiveModel, Column as ClientColumn, Entity as ClientEntity,
            Model as ClientModel,
        },
        onboarding::ActiveModel as OnboardingActiveModel,
        order::{Column as OrderColumn, Entity as OrderEntity, Model as OrderModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_lifecycle::OrderStatus,
};

/// A verified inbox purchase extracted from a checkout-completed event.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutPurchase {
    #[validate(length(min = 1, message = "Checkout session id is required"))]
    pub checkout_session_id: String,
    pub workspace_id: Uuid,
    #[validate(length(min = 1, message = "External customer id is required"))]
    pub external_customer_id: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    #[validate(range(min = 1, max = 10_000, message = "Quantity out of range"))]
    pub quantity: i32,
    pub skus: Vec<String>,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub currency: String,
}

/// CRUD plus creation-from-checkout over order records. The single source
/// of truth for lifecycle state lives in the `orders` table; status
/// mutation goes through the lifecycle service, never through here.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
    unit_price_cents: i64,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>, unit_price_cents: i64) -> Self {
        Self {
            db,
            event_sender,
            unit_price_cents,
        }
    }

    /// Creates the order and its empty onboarding scaffold for a verified
    /// checkout purchase, in one store transaction.
    ///
    /// The unique index on `checkout_session_id` is the second line of
    /// defense behind the idempotency ledger: a duplicate session maps to
    /// `Conflict`, which webhook ingestion absorbs as a duplicate.
    #[instrument(skip(self, purchase), fields(session = %purchase.checkout_session_id, workspace = %purchase.workspace_id))]
    pub async fn create_from_checkout(
        &self,
        purchase: CheckoutPurchase,
    ) -> Result<OrderModel, ServiceError> {
        purchase.validate()?;

        let client = self.resolve_or_create_client(&purchase).await?;

        let db = &*self.db;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = allocate_order_number();
        let inbox_count = purchase.quantity;
        // Cold-email hygiene: batches of up to three mailboxes per domain.
        let domain_count = (inbox_count + 2) / 3;
        let total_amount_cents = i64::from(purchase.quantity) * self.unit_price_cents;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order = crate::entities::order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            checkout_session_id: Set(purchase.checkout_session_id.clone()),
            workspace_id: Set(purchase.workspace_id),
            client_id: Set(client.id),
            status: Set(OrderStatus::Placed.to_string()),
            inbox_count: Set(inbox_count),
            domain_count: Set(domain_count),
            total_amount_cents: Set(total_amount_cents),
            currency: Set(purchase.currency.clone()),
            skus: Set(serde_json::json!(purchase.skus)),
            order_date: Set(now),
            fulfilled_date: Set(None),
            fulfillment_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };

        let order = match order.insert(&txn).await {
            Ok(order) => order,
            Err(e) => {
                if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                    return Err(ServiceError::Conflict(format!(
                        "checkout session {} already originated an order",
                        purchase.checkout_session_id
                    )));
                }
                return Err(ServiceError::DatabaseError(e));
            }
        };

        let scaffold = OnboardingActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            business_type: Set(None),
            industry: Set(None),
            company_size: Set(None),
            website: Set(None),
            domain_preferences: Set(None),
            personas: Set(None),
            esp_credentials: Set(None),
            step_completed: Set(0),
            is_completed: Set(false),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        };
        scaffold.insert(&txn).await?;

        txn.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            inbox_count,
            total_amount_cents,
            "order created from checkout"
        );

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::OrderPlaced {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    workspace_id: order.workspace_id,
                })
                .await;
        }

        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find_by_id(order_id).one(&*self.db).await?;
        Ok(order)
    }

    /// Looks an order up by its originating checkout-session identifier.
    /// The onboarding UI resumes sessions through this without knowing the
    /// internal id.
    #[instrument(skip(self))]
    pub async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(OrderColumn::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(OrderColumn::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    /// Finds the payer inside the workspace, creating the record on first
    /// purchase. Concurrent creations race on the unique
    /// (workspace, external customer) index; the loser re-reads.
    async fn resolve_or_create_client(
        &self,
        purchase: &CheckoutPurchase,
    ) -> Result<ClientModel, ServiceError> {
        let db = &*self.db;

        let existing = ClientEntity::find()
            .filter(ClientColumn::WorkspaceId.eq(purchase.workspace_id))
            .filter(ClientColumn::ExternalCustomerId.eq(purchase.external_customer_id.clone()))
            .one(db)
            .await?;
        if let Some(client) = existing {
            return Ok(client);
        }

        let candidate = ClientActiveModel {
            id: Set(Uuid::new_v4()),
            workspace_id: Set(purchase.workspace_id),
            external_customer_id: Set(purchase.external_customer_id.clone()),
            email: Set(purchase.customer_email.clone()),
            name: Set(purchase.customer_name.clone()),
            created_at: Set(Utc::now()),
        };

        match candidate.insert(db).await {
            Ok(client) => Ok(client),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => ClientEntity::find()
                    .filter(ClientColumn::WorkspaceId.eq(purchase.workspace_id))
                    .filter(
                        ClientColumn::ExternalCustomerId
                            .eq(purchase.external_customer_id.clone()),
                    )
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "client vanished after unique-constraint race".to_string(),
                        )
                    }),
                _ => Err(ServiceError::DatabaseError(e)),
            },
        }
    }
}

fn allocate_order_number() -> String {
    let discriminator = Uuid::new_v4().simple().to_string();
    format!(
        "MB-{}-{}",
        Utc::now().format("%Y%m%d"),
        discriminator[..8].to_uppercase()
    )
}
