use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        mail_domain::{ActiveModel as MailDomainActiveModel, Entity as MailDomainEntity},
        mailbox::ActiveModel as MailboxActiveModel,
        order::{Column as OrderColumn, Entity as OrderEntity, Model as OrderModel},
        persona::ActiveModel as PersonaActiveModel,
        subscription::ActiveModel as SubscriptionActiveModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        onboarding::PersonaDefinition,
        order_lifecycle::{next_status, parse_status, OrderSignal, OrderStatus, Transition},
    },
};

/// SKUs that carry recurring billing. An order whose product list names
/// one of these gets exactly one subscription at fulfillment time.
const SUBSCRIPTION_SKUS: &[&str] = &["inbox_subscription_monthly", "inbox_subscription_annual"];

const DOMAIN_INITIAL_STATUS: &str = "pending_dns";
const SUBSCRIPTION_INITIAL_STATUS: &str = "active";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DomainSpec {
    #[validate(length(min = 3, max = 253, message = "Domain name length out of range"))]
    pub name: String,
}

/// A mailbox to create, anchored to a domain created in the same request
/// (`domain_ref`, an index into `domains`) or to a pre-existing one
/// (`domain_id`). Exactly one of the two must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct InboxSpec {
    #[validate(length(min = 3, max = 320, message = "Address length out of range"))]
    pub address: String,
    pub display_name: Option<String>,
    pub domain_ref: Option<usize>,
    pub domain_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FulfillmentRequest {
    #[serde(default)]
    pub domains: Vec<DomainSpec>,
    #[serde(default)]
    pub inboxes: Vec<InboxSpec>,
    #[serde(default)]
    pub personas: Vec<PersonaDefinition>,
    pub notes: Option<String>,
}

/// Everything a fulfillment run created, for the operator to review.
#[derive(Debug, Serialize)]
pub struct ProvisionedResources {
    pub order: OrderModel,
    pub domains: Vec<crate::entities::mail_domain::Model>,
    pub mailboxes: Vec<crate::entities::mailbox::Model>,
    pub personas: Vec<crate::entities::persona::Model>,
    pub subscription: Option<crate::entities::subscription::Model>,
}

/// Outcome of a fulfillment call. `AlreadyFulfilled` is a benign no-op
/// signal, distinct from errors, so a retried call never provisions twice.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    Fulfilled(ProvisionedResources),
    AlreadyFulfilled,
}

/// Converts an order plus its onboarding data into provisioned resources,
/// exactly once, inside a single store transaction.
///
/// Resource creation and the terminal status transition commit together
/// or not at all; a partial failure leaves the order retryable with
/// nothing recorded.
#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl FulfillmentService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn fulfill(
        &self,
        order_id: Uuid,
        request: FulfillmentRequest,
    ) -> Result<FulfillmentOutcome, ServiceError> {
        validate_request(&request)?;

        let db = &*self.db;
        let txn = db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = parse_status(&order.status)?;
        match next_status(from, OrderSignal::Fulfilled)? {
            Transition::NoOp => {
                txn.rollback().await?;
                info!(%order_id, "order already delivered; fulfillment is a no-op");
                return Ok(FulfillmentOutcome::AlreadyFulfilled);
            }
            Transition::To(OrderStatus::Delivered) => {}
            Transition::To(other) => {
                txn.rollback().await?;
                return Err(ServiceError::InternalError(format!(
                    "fulfillment signal produced unexpected status '{}'",
                    other
                )));
            }
        }

        let now = Utc::now();
        let workspace_id = order.workspace_id;
        let client_id = order.client_id;

        let mut domains = Vec::with_capacity(request.domains.len());
        for spec in &request.domains {
            let domain = MailDomainActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(spec.name.clone()),
                status: Set(DOMAIN_INITIAL_STATUS.to_string()),
                order_id: Set(order_id),
                workspace_id: Set(workspace_id),
                client_id: Set(client_id),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            domains.push(domain);
        }

        let mut mailboxes = Vec::with_capacity(request.inboxes.len());
        for spec in &request.inboxes {
            let domain_id = match (spec.domain_ref, spec.domain_id) {
                (Some(index), None) => domains
                    .get(index)
                    .map(|d| d.id)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "inbox {} references domain index {} but only {} domains were requested",
                            spec.address,
                            index,
                            domains.len()
                        ))
                    })?,
                (None, Some(id)) => {
                    MailDomainEntity::find_by_id(id)
                        .one(&txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Mail domain {} not found", id))
                        })?
                        .id
                }
                _ => {
                    return Err(ServiceError::ValidationError(format!(
                        "inbox {} must reference exactly one of domain_ref or domain_id",
                        spec.address
                    )))
                }
            };

            let mailbox = MailboxActiveModel {
                id: Set(Uuid::new_v4()),
                address: Set(spec.address.clone()),
                display_name: Set(spec.display_name.clone()),
                domain_id: Set(domain_id),
                order_id: Set(order_id),
                workspace_id: Set(workspace_id),
                client_id: Set(client_id),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            mailboxes.push(mailbox);
        }

        let mut personas = Vec::with_capacity(request.personas.len());
        for spec in &request.personas {
            let persona = PersonaActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(spec.name.clone()),
                role: Set(spec.role.clone()),
                tags: Set(Some(serde_json::json!(spec.tags))),
                order_id: Set(order_id),
                workspace_id: Set(workspace_id),
                client_id: Set(client_id),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            personas.push(persona);
        }

        let subscription = match subscription_sku(&order) {
            Some(sku) => Some(
                SubscriptionActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    sku: Set(sku),
                    status: Set(SUBSCRIPTION_INITIAL_STATUS.to_string()),
                    workspace_id: Set(workspace_id),
                    client_id: Set(client_id),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await?,
            ),
            None => None,
        };

        // Terminal transition, guarded on the status read above so a
        // concurrent fulfill or cancellation aborts this whole unit.
        let update = OrderEntity::update_many()
            .col_expr(
                OrderColumn::Status,
                Expr::value(OrderStatus::Delivered.to_string()),
            )
            .col_expr(OrderColumn::FulfilledDate, Expr::value(now))
            .col_expr(
                OrderColumn::FulfillmentNotes,
                Expr::value(request.notes.clone()),
            )
            .col_expr(OrderColumn::UpdatedAt, Expr::value(now))
            .col_expr(OrderColumn::Version, Expr::col(OrderColumn::Version).add(1))
            .filter(OrderColumn::Id.eq(order_id))
            .filter(OrderColumn::Status.eq(from.to_string()))
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            txn.rollback().await?;
            warn!(%order_id, %from, "lost fulfillment race; rolled back");
            return Err(ServiceError::Conflict(format!(
                "order {} was modified concurrently during fulfillment",
                order_id
            )));
        }

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("order vanished during fulfillment".to_string())
            })?;

        txn.commit().await?;

        info!(
            %order_id,
            domains = domains.len(),
            mailboxes = mailboxes.len(),
            personas = personas.len(),
            subscription = subscription.is_some(),
            "order fulfilled"
        );

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::OrderFulfilled {
                    order_id,
                    domains: domains.len(),
                    mailboxes: mailboxes.len(),
                    personas: personas.len(),
                    subscription: subscription.is_some(),
                })
                .await;
        }

        Ok(FulfillmentOutcome::Fulfilled(ProvisionedResources {
            order,
            domains,
            mailboxes,
            personas,
            subscription,
        }))
    }
}

fn validate_request(request: &FulfillmentRequest) -> Result<(), ServiceError> {
    for domain in &request.domains {
        domain.validate()?;
    }
    for inbox in &request.inboxes {
        inbox.validate()?;
    }
    Ok(())
}

/// The first purchased SKU that carries recurring billing, if any.
fn subscription_sku(order: &OrderModel) -> Option<String> {
    order
        .skus
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .find(|sku| SUBSCRIPTION_SKUS.contains(sku))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order_with_skus(skus: serde_json::Value) -> OrderModel {
        OrderModel {
            id: Uuid::new_v4(),
            order_number: "MB-20260825-TEST0001".into(),
            checkout_session_id: "cs_test".into(),
            workspace_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            status: "processing".into(),
            inbox_count: 3,
            domain_count: 1,
            total_amount_cents: 9000,
            currency: "USD".into(),
            skus,
            order_date: Utc::now(),
            fulfilled_date: None,
            fulfillment_notes: None,
            created_at: Utc::now(),
            updated_at: None,
            version: 1,
        }
    }

    #[test]
    fn recognizes_subscription_skus() {
        let order = order_with_skus(serde_json::json!([
            "inbox_purchase",
            "inbox_subscription_monthly"
        ]));
        assert_eq!(
            subscription_sku(&order).as_deref(),
            Some("inbox_subscription_monthly")
        );
    }

    #[test]
    fn orders_without_subscription_skus_get_none() {
        let order = order_with_skus(serde_json::json!(["inbox_purchase"]));
        assert_eq!(subscription_sku(&order), None);

        let empty = order_with_skus(serde_json::json!([]));
        assert_eq!(subscription_sku(&empty), None);
    }

    #[test]
    fn inbox_must_name_exactly_one_domain_reference() {
        let request = FulfillmentRequest {
            domains: vec![],
            inboxes: vec![InboxSpec {
                address: "x@a.com".into(),
                display_name: None,
                domain_ref: None,
                domain_id: None,
            }],
            personas: vec![],
            notes: None,
        };
        // Structural validation passes; the reference check happens during
        // the transaction, where the domain list is known.
        assert!(validate_request(&request).is_ok());
    }
}
