use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, SqlErr};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::webhook_event::{
        ActiveModel as WebhookEventActiveModel, Column as WebhookEventColumn,
        Entity as WebhookEventEntity,
    },
    errors::ServiceError,
};

/// Result of attempting to mark an event identifier as processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This call won the race; the caller owns the side effects.
    FirstDelivery,
    /// Some earlier delivery already handled this event.
    AlreadyProcessed,
}

/// Durable ledger of payment-gateway event identifiers that have already
/// been handled.
///
/// Backed by the same transactional store as order data so every process
/// serving webhook traffic shares one view. The check-and-mark pair is a
/// single unique-constrained insert: a constraint violation means "already
/// processed", never an error to surface.
#[derive(Clone)]
pub struct IdempotencyLedger {
    db: Arc<DbPool>,
}

impl IdempotencyLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Whether `event_id` has been handled before. Read-only; racing
    /// callers must use `mark_processed` for the authoritative answer.
    #[instrument(skip(self))]
    pub async fn already_processed(&self, event_id: &str) -> Result<bool, ServiceError> {
        let existing = WebhookEventEntity::find()
            .filter(WebhookEventColumn::EventId.eq(event_id))
            .one(&*self.db)
            .await?;
        Ok(existing.is_some())
    }

    /// Atomically records `event_id` as processed.
    #[instrument(skip(self))]
    pub async fn mark_processed(&self, event_id: &str) -> Result<MarkOutcome, ServiceError> {
        let mark = WebhookEventActiveModel {
            id: Set(Uuid::new_v4()),
            event_id: Set(event_id.to_string()),
            processed_at: Set(Utc::now()),
        };

        match mark.insert(&*self.db).await {
            Ok(_) => Ok(MarkOutcome::FirstDelivery),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    debug!(event_id, "webhook event already processed");
                    Ok(MarkOutcome::AlreadyProcessed)
                }
                _ => Err(ServiceError::DatabaseError(e)),
            },
        }
    }
}
