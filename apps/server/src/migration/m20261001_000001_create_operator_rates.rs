//! Create operator_rates table.
//!
//! Current CPA per operator. Sign-ups copy the value at submission time.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OperatorRates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OperatorRates::OperatorId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OperatorRates::CpaAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorRates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OperatorRates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum OperatorRates {
    Table,
    OperatorId,
    CpaAmountCents,
    UpdatedAt,
}
