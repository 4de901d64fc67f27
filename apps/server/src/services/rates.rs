//! Operator commission-rate lookup.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::cents_to_decimal;

/// Errors resolving an operator's current rate.
#[derive(Debug, thiserror::Error)]
pub enum RateLookupError {
    #[error("no commission rate configured for operator {0}")]
    NotFound(Uuid),

    #[error("rate lookup unavailable: {0}")]
    Unavailable(String),
}

impl From<RateLookupError> for AppError {
    fn from(err: RateLookupError) -> Self {
        AppError::CpaLookup(err.to_string())
    }
}

/// Source of the commission rate copied onto each new sign-up.
#[async_trait]
pub trait CommissionRates: Send + Sync {
    async fn resolve_rate(&self, operator_id: Uuid) -> Result<Decimal, RateLookupError>;
}

/// Reads rates from the `operator_rates` table.
#[derive(Clone)]
pub struct DbCommissionRates {
    pool: DbPool,
}

impl DbCommissionRates {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommissionRates for DbCommissionRates {
    async fn resolve_rate(&self, operator_id: Uuid) -> Result<Decimal, RateLookupError> {
        let rate = self
            .pool
            .get_operator_rate(operator_id)
            .await
            .map_err(|e| RateLookupError::Unavailable(e.to_string()))?
            .ok_or(RateLookupError::NotFound(operator_id))?;

        Ok(cents_to_decimal(rate.cpa_amount_cents))
    }
}
