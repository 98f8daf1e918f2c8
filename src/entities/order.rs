use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A purchase record tracked from payment through resource delivery.
///
/// Rows are never deleted; cancelled and delivered orders are retained for
/// audit. `total_amount_cents` is immutable once set and
/// `checkout_session_id` is written exactly once at creation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub order_number: String,

    /// External checkout-session identifier that originated this order.
    /// Unique; the onboarding UI resumes sessions through it.
    pub checkout_session_id: String,

    pub workspace_id: Uuid,
    pub client_id: Uuid,
    pub status: String,
    pub inbox_count: i32,
    pub domain_count: i32,
    pub total_amount_cents: i64,
    pub currency: String,
    /// Product SKUs purchased in the originating checkout.
    pub skus: Json,
    pub order_date: DateTime<Utc>,
    /// Non-null if and only if status is `delivered`.
    pub fulfilled_date: Option<DateTime<Utc>>,
    pub fulfillment_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::onboarding::Entity")]
    Onboarding,
    #[sea_orm(has_many = "super::mailbox::Entity")]
    Mailboxes,
    #[sea_orm(has_many = "super::mail_domain::Entity")]
    MailDomains,
}

impl Related<super::onboarding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Onboarding.def()
    }
}

impl Related<super::mailbox::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mailboxes.def()
    }
}

impl Related<super::mail_domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MailDomains.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(self)
    }
}
