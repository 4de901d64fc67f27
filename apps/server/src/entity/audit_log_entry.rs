//! Audit log entity for SeaORM. Rows are append-only.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sign_up_id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub details: Option<JsonValue>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sign_up::Entity",
        from = "Column::SignUpId",
        to = "super::sign_up::Column::Id",
        on_delete = "Restrict"
    )]
    SignUp,
}

impl Related<super::sign_up::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SignUp.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
