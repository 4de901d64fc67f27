//! Create audit_log_entries table (append-only).

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
                    .table(AuditLogEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLogEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditLogEntries::SignUpId).uuid().not_null())
                    .col(
                        ColumnDef::new(AuditLogEntries::Action)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuditLogEntries::ActorId).uuid().null())
                    .col(ColumnDef::new(AuditLogEntries::Details).json_binary().null())
                    .col(
                        ColumnDef::new(AuditLogEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(AuditLogEntries::Table, AuditLogEntries::SignUpId)
                            .to(SignUps::Table, SignUps::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_entries_sign_up_id")
                    .table(AuditLogEntries::Table)
                    .col(AuditLogEntries::SignUpId)
                    .col(AuditLogEntries::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLogEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum AuditLogEntries {
    Table,
    Id,
    SignUpId,
    Action,
    ActorId,
    Details,
    CreatedAt,
}
