use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Buyer-supplied configuration collected across the onboarding interview,
/// 1:1 with an order (unique foreign key).
///
/// `step_completed` only ever increases. Once `is_completed` is set the
/// record is frozen and the aggregator rejects further writes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "onboarding_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_id: Uuid,

    pub business_type: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub website: Option<String>,
    /// Free-text domain name wishes, ordered.
    pub domain_preferences: Option<Json>,
    /// Ordered list of {name, role, tags}; bounded by the save endpoint.
    pub personas: Option<Json>,
    /// Opaque email-service-provider credential payload.
    pub esp_credentials: Option<Json>,
    pub step_completed: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
