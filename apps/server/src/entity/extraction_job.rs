//! Extraction job entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "extraction_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sign_up_id: Uuid,
    /// pending, processing, completed, failed
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTimeUtc,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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
