use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        onboarding::{
            ActiveModel as OnboardingActiveModel, Column as OnboardingColumn,
            Entity as OnboardingEntity, Model as OnboardingModel,
        },
        order::{Column as OrderColumn, Entity as OrderEntity, Model as OrderModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Number of steps in the onboarding interview. A completed record always
/// carries this value in `step_completed`.
pub const MAX_ONBOARDING_STEP: i32 = 5;

const MAX_PERSONAS: usize = 25;

/// Reference to an order from the onboarding UI: the internal id, or the
/// external checkout-session id when the UI resumes a session without
/// knowing the internal one.
#[derive(Debug, Clone)]
pub enum OrderRef {
    Id(Uuid),
    CheckoutSession(String),
}

/// A persona definition supplied during onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonaDefinition {
    pub name: String,
    pub role: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One partial save from the onboarding interview. Omitted fields leave
/// the stored record untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct OnboardingSave {
    pub business_type: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub website: Option<String>,
    pub domain_preferences: Option<Vec<String>>,
    pub personas: Option<Vec<PersonaDefinition>>,
    pub esp_credentials: Option<serde_json::Value>,
    #[validate(range(min = 0, max = 5, message = "Step out of range"))]
    pub step_completed: Option<i32>,
    pub is_completed: Option<bool>,
}

/// Accumulates partial buyer input across any number of save calls into
/// one onboarding record per order.
///
/// Merging is last-write-wins per field and idempotent; `step_completed`
/// only ever grows. Completion freezes the record — the fulfillment
/// transaction, not this aggregator, owns the order's terminal transition.
#[derive(Clone)]
pub struct OnboardingService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl OnboardingService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, payload))]
    pub async fn save(
        &self,
        order_ref: OrderRef,
        payload: OnboardingSave,
    ) -> Result<OnboardingModel, ServiceError> {
        payload.validate()?;
        if let Some(personas) = &payload.personas {
            if personas.len() > MAX_PERSONAS {
                return Err(ServiceError::ValidationError(format!(
                    "at most {} personas are allowed",
                    MAX_PERSONAS
                )));
            }
        }

        let db = &*self.db;
        let order = self.resolve_order(&order_ref).await?;

        let existing = OnboardingEntity::find()
            .filter(OnboardingColumn::OrderId.eq(order.id))
            .one(db)
            .await?;

        // The scaffold is created with the order; recreate it here only if
        // an operator removed it out of band.
        let record = match existing {
            Some(record) => record,
            None => {
                let scaffold = OnboardingActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
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
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                };
                scaffold.insert(db).await?
            }
        };

        if record.is_completed {
            return Err(ServiceError::OnboardingFrozen(format!(
                "onboarding for order {} is completed and no longer accepts changes",
                order.id
            )));
        }

        let completes = payload.is_completed == Some(true);
        let mut active = merge_into_active(&record, &payload)?;
        active.updated_at = Set(Some(Utc::now()));
        if completes {
            active.is_completed = Set(true);
            active.step_completed = Set(MAX_ONBOARDING_STEP);
            active.completed_at = Set(Some(Utc::now()));
        }

        let merged = active.update(db).await?;

        if completes {
            info!(order_id = %order.id, "onboarding completed");
            if let Some(sender) = &self.event_sender {
                let _ = sender
                    .send(Event::OnboardingCompleted { order_id: order.id })
                    .await;
            }
        }

        Ok(merged)
    }

    #[instrument(skip(self))]
    pub async fn get_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OnboardingModel>, ServiceError> {
        let record = OnboardingEntity::find()
            .filter(OnboardingColumn::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;
        Ok(record)
    }

    async fn resolve_order(&self, order_ref: &OrderRef) -> Result<OrderModel, ServiceError> {
        let db = &*self.db;
        let order = match order_ref {
            OrderRef::Id(id) => OrderEntity::find_by_id(*id).one(db).await?,
            OrderRef::CheckoutSession(session) => {
                OrderEntity::find()
                    .filter(OrderColumn::CheckoutSessionId.eq(session.clone()))
                    .one(db)
                    .await?
            }
        };

        order.ok_or_else(|| match order_ref {
            OrderRef::Id(id) => ServiceError::NotFound(format!("Order {} not found", id)),
            OrderRef::CheckoutSession(session) => {
                ServiceError::NotFound(format!("No order for checkout session {}", session))
            }
        })
    }
}

/// Last-write-wins merge of one save payload into the stored record.
/// Omitted fields are untouched; `step_completed` is monotone.
fn merge_into_active(
    record: &OnboardingModel,
    payload: &OnboardingSave,
) -> Result<OnboardingActiveModel, ServiceError> {
    let mut active = record.clone().into_active_model();

    if let Some(value) = &payload.business_type {
        active.business_type = Set(Some(value.clone()));
    }
    if let Some(value) = &payload.industry {
        active.industry = Set(Some(value.clone()));
    }
    if let Some(value) = &payload.company_size {
        active.company_size = Set(Some(value.clone()));
    }
    if let Some(value) = &payload.website {
        active.website = Set(Some(value.clone()));
    }
    if let Some(value) = &payload.domain_preferences {
        active.domain_preferences = Set(Some(serde_json::json!(value)));
    }
    if let Some(value) = &payload.personas {
        let encoded = serde_json::to_value(value)
            .map_err(|e| ServiceError::InternalError(format!("persona encoding: {}", e)))?;
        active.personas = Set(Some(encoded));
    }
    if let Some(value) = &payload.esp_credentials {
        active.esp_credentials = Set(Some(value.clone()));
    }

    active.step_completed = Set(merged_step(record.step_completed, payload.step_completed));

    Ok(active)
}

/// Progress never regresses, whatever order saves arrive in.
fn merged_step(current: i32, incoming: Option<i32>) -> i32 {
    current.max(incoming.unwrap_or(current)).min(MAX_ONBOARDING_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::ActiveValue;

    fn record() -> OnboardingModel {
        OnboardingModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            business_type: Some("agency".into()),
            industry: None,
            company_size: None,
            website: None,
            domain_preferences: None,
            personas: None,
            esp_credentials: None,
            step_completed: 2,
            is_completed: false,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn step_progress_is_monotone() {
        assert_eq!(merged_step(2, Some(3)), 3);
        assert_eq!(merged_step(3, Some(1)), 3);
        assert_eq!(merged_step(3, None), 3);
        assert_eq!(merged_step(0, Some(99)), MAX_ONBOARDING_STEP);
    }

    #[test]
    fn omitted_fields_are_untouched() {
        let payload = OnboardingSave {
            industry: Some("saas".into()),
            ..Default::default()
        };
        let active = merge_into_active(&record(), &payload).unwrap();

        // Industry was provided, business_type was not.
        assert_eq!(active.industry, ActiveValue::Set(Some("saas".into())));
        match active.business_type {
            ActiveValue::Unchanged(ref v) => assert_eq!(v.as_deref(), Some("agency")),
            ref other => panic!("business_type should be unchanged, got {:?}", other),
        }
    }

    #[test]
    fn repeated_identical_saves_merge_idempotently() {
        let payload = OnboardingSave {
            website: Some("https://example.com".into()),
            step_completed: Some(2),
            ..Default::default()
        };
        let first = merge_into_active(&record(), &payload).unwrap();
        let second = merge_into_active(&record(), &payload).unwrap();
        assert_eq!(first.website, second.website);
        assert_eq!(first.step_completed, second.step_completed);
    }
}
