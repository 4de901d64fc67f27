//! Create extraction_jobs table.
//!
//! Durable queue of extraction work, one row per sign-up with an image.

use sea_orm_migration::prelude::*;

use super::m20261001_000002_create_sign_ups::SignUps;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExtractionJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExtractionJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExtractionJobs::SignUpId).uuid().not_null())
                    .col(
                        ColumnDef::new(ExtractionJobs::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ExtractionJobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ExtractionJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(ExtractionJobs::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExtractionJobs::LastError).text().null())
                    .col(
                        ColumnDef::new(ExtractionJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExtractionJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ExtractionJobs::Table, ExtractionJobs::SignUpId)
                            .to(SignUps::Table, SignUps::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_extraction_jobs_sign_up_id")
                    .table(ExtractionJobs::Table)
                    .col(ExtractionJobs::SignUpId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Worker poll: status = pending AND next_attempt_at <= now
        manager
            .create_index(
                Index::create()
                    .name("idx_extraction_jobs_due")
                    .table(ExtractionJobs::Table)
                    .col(ExtractionJobs::Status)
                    .col(ExtractionJobs::NextAttemptAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExtractionJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ExtractionJobs {
    Table,
    Id,
    SignUpId,
    Status,
    AttemptCount,
    MaxAttempts,
    NextAttemptAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
