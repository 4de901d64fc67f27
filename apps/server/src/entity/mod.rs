//! SeaORM entity definitions.

pub mod audit_log_entry;
pub mod extraction_job;
pub mod operator_rate;
pub mod sign_up;
