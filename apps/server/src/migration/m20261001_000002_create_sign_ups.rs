//! Create sign_ups table.
//!
//! One row per customer conversion. The unique idempotency index is what makes
//! concurrent retried submissions collapse onto a single row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SignUps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SignUps::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SignUps::IdempotencyKey).uuid().not_null())
                    .col(ColumnDef::new(SignUps::AmbassadorId).uuid().not_null())
                    .col(ColumnDef::new(SignUps::EventId).uuid().null())
                    .col(ColumnDef::new(SignUps::SoloChatId).uuid().null())
                    .col(ColumnDef::new(SignUps::OperatorId).uuid().not_null())
                    .col(ColumnDef::new(SignUps::CustomerName).string_len(200).not_null())
                    .col(ColumnDef::new(SignUps::CustomerEmail).string_len(320).not_null())
                    .col(ColumnDef::new(SignUps::CustomerPhone).string_len(40).null())
                    .col(ColumnDef::new(SignUps::CustomerState).string_len(40).null())
                    .col(
                        ColumnDef::new(SignUps::CpaAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SignUps::BetSlipImageRef).string_len(500).null())
                    .col(
                        ColumnDef::new(SignUps::BetSlipContentType)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(SignUps::BetAmountCents).big_integer().null())
                    .col(ColumnDef::new(SignUps::TeamBetOn).string_len(200).null())
                    .col(ColumnDef::new(SignUps::Odds).string_len(40).null())
                    .col(ColumnDef::new(SignUps::ExtractionConfidence).double().null())
                    .col(
                        ColumnDef::new(SignUps::ExtractionStatus)
                            .string_len(20)
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(SignUps::ExtractionDetails).json_binary().null())
                    .col(
                        ColumnDef::new(SignUps::ReviewStatus)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(SignUps::ResolvedBy).uuid().null())
                    .col(
                        ColumnDef::new(SignUps::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SignUps::ResolutionNotes).text().null())
                    .col(
                        ColumnDef::new(SignUps::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SignUps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sign_ups_idempotency_key")
                    .table(SignUps::Table)
                    .col(SignUps::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Duplicate detection: (email, operator) within a time window
        manager
            .create_index(
                Index::create()
                    .name("idx_sign_ups_email_operator")
                    .table(SignUps::Table)
                    .col(SignUps::CustomerEmail)
                    .col(SignUps::OperatorId)
                    .col(SignUps::SubmittedAt)
                    .to_owned(),
            )
            .await?;

        // Review queue scope
        manager
            .create_index(
                Index::create()
                    .name("idx_sign_ups_review")
                    .table(SignUps::Table)
                    .col(SignUps::ReviewStatus)
                    .col(SignUps::ExtractionStatus)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SignUps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SignUps {
    Table,
    Id,
    IdempotencyKey,
    AmbassadorId,
    EventId,
    SoloChatId,
    OperatorId,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    CustomerState,
    CpaAmountCents,
    BetSlipImageRef,
    BetSlipContentType,
    BetAmountCents,
    TeamBetOn,
    Odds,
    ExtractionConfidence,
    ExtractionStatus,
    ExtractionDetails,
    ReviewStatus,
    ResolvedBy,
    ResolvedAt,
    ResolutionNotes,
    SubmittedAt,
    UpdatedAt,
}
