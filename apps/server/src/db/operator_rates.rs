//! Database queries for operator commission rates.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::operator_rate::{self as rate, ActiveModel, Entity as OperatorRate};
use crate::error::{AppError, AppResult};

use super::DbPool;

impl DbPool {
    /// Current rate for an operator.
    pub async fn get_operator_rate(&self, operator_id: Uuid) -> AppResult<Option<rate::Model>> {
        OperatorRate::find_by_id(operator_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get operator rate: {}", e)))
    }

    /// Insert or replace an operator's current rate.
    ///
    /// Existing sign-ups are unaffected; they carry their own frozen copy.
    pub async fn upsert_operator_rate(
        &self,
        operator_id: Uuid,
        cpa_amount_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let model = ActiveModel {
            operator_id: Set(operator_id),
            cpa_amount_cents: Set(cpa_amount_cents),
            updated_at: Set(now),
        };

        OperatorRate::insert(model)
            .on_conflict(
                OnConflict::column(rate::Column::OperatorId)
                    .update_columns([rate::Column::CpaAmountCents, rate::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to upsert operator rate: {}", e)))?;

        Ok(())
    }

    /// All configured rates.
    pub async fn list_operator_rates(&self) -> AppResult<Vec<rate::Model>> {
        OperatorRate::find()
            .order_by_asc(rate::Column::OperatorId)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list operator rates: {}", e)))
    }
}
