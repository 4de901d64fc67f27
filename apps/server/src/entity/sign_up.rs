//! Sign-up entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sign_ups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Client-supplied key; at most one row per key
    #[sea_orm(unique)]
    pub idempotency_key: Uuid,
    pub ambassador_id: Uuid,
    pub event_id: Option<Uuid>,
    pub solo_chat_id: Option<Uuid>,
    pub operator_id: Uuid,
    pub customer_name: String,
    /// Normalised (trimmed, lower-cased)
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_state: Option<String>,
    /// Commission rate frozen at submission, in cents
    pub cpa_amount_cents: i64,
    pub bet_slip_image_ref: Option<String>,
    pub bet_slip_content_type: Option<String>,
    pub bet_amount_cents: Option<i64>,
    pub team_bet_on: Option<String>,
    pub odds: Option<String>,
    /// 0-100, two decimal places
    pub extraction_confidence: Option<f64>,
    /// none, pending, processing, completed, failed
    pub extraction_status: String,
    /// Field confidences, warnings and raw model response
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub extraction_details: Option<JsonValue>,
    /// pending, confirmed, skipped
    pub review_status: String,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTimeUtc>,
    pub resolution_notes: Option<String>,
    pub submitted_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::extraction_job::Entity")]
    ExtractionJob,
    #[sea_orm(has_many = "super::audit_log_entry::Entity")]
    AuditLogEntries,
}

impl Related<super::extraction_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExtractionJob.def()
    }
}

impl Related<super::audit_log_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditLogEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
