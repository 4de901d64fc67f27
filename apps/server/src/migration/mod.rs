//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_operator_rates;
mod m20261001_000002_create_sign_ups;
mod m20261001_000003_create_extraction_jobs;
mod m20261001_000004_create_audit_log_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_operator_rates::Migration),
            Box::new(m20261001_000002_create_sign_ups::Migration),
            Box::new(m20261001_000003_create_extraction_jobs::Migration),
            Box::new(m20261001_000004_create_audit_log_entries::Migration),
        ]
    }
}
