//! Database queries for sign-ups.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Order, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::extraction_job;
use crate::entity::sign_up::{self, ActiveModel, Entity as SignUp};
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditAction, ExtractionStatus, JobStatus, MAX_EXTRACTION_ATTEMPTS, MissingField, ReviewQuery,
    ReviewStatus,
};

use super::audit_log::{self, NewAuditEntry};
use super::{DbPool, is_unique_violation};

/// Sort key 1 of the review queue: 0 when a critical field is missing.
const MISSING_CRITICAL_FIELD_KEY: &str =
    "CASE WHEN bet_amount_cents IS NULL OR team_bet_on IS NULL THEN 0 ELSE 1 END";

/// Sort key 2 of the review queue: confidence with NULL treated as 0.
const CONFIDENCE_KEY: &str = "COALESCE(extraction_confidence, 0)";

/// A validated sign-up ready to persist.
#[derive(Debug, Clone)]
pub struct NewSignUp {
    pub id: Uuid,
    pub idempotency_key: Uuid,
    pub ambassador_id: Uuid,
    pub event_id: Option<Uuid>,
    pub solo_chat_id: Option<Uuid>,
    pub operator_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_state: Option<String>,
    pub cpa_amount_cents: i64,
    pub bet_slip_image_ref: Option<String>,
    pub bet_slip_content_type: Option<String>,
    /// Hex SHA-256 of the decoded image, recorded in the audit trail.
    pub bet_slip_sha256: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Result of the atomic idempotent insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Created {
        sign_up: sign_up::Model,
        job: Option<extraction_job::Model>,
    },
    /// Another submission with the same idempotency key won the race.
    Existing(sign_up::Model),
}

/// Review fields written by the confirmation workflow.
#[derive(Debug, Clone)]
pub struct ReviewResolution {
    pub status: ReviewStatus,
    pub resolved_by: Uuid,
    pub resolution_notes: Option<String>,
    /// Final field values; only written on confirmation.
    pub final_fields: Option<FinalFields>,
}

#[derive(Debug, Clone)]
pub struct FinalFields {
    pub bet_amount_cents: Option<i64>,
    pub team_bet_on: Option<String>,
    pub odds: Option<String>,
}

impl DbPool {
    /// Get a sign-up by ID.
    pub async fn get_sign_up_by_id(&self, id: Uuid) -> AppResult<Option<sign_up::Model>> {
        SignUp::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get sign-up: {}", e)))
    }

    /// Find the sign-up created for an idempotency key.
    pub async fn find_sign_up_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> AppResult<Option<sign_up::Model>> {
        SignUp::find()
            .filter(sign_up::Column::IdempotencyKey.eq(key))
            .one(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to find sign-up by idempotency key: {}", e))
            })
    }

    /// Most recent sign-up for the same customer and operator since `since`.
    pub async fn find_recent_duplicate(
        &self,
        customer_email: &str,
        operator_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Option<sign_up::Model>> {
        SignUp::find()
            .filter(sign_up::Column::CustomerEmail.eq(customer_email))
            .filter(sign_up::Column::OperatorId.eq(operator_id))
            .filter(sign_up::Column::SubmittedAt.gte(since))
            .order_by_desc(sign_up::Column::SubmittedAt)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to check for duplicates: {}", e)))
    }

    /// Persist a sign-up, its extraction job (when an image was stored) and
    /// the audit entries in one transaction.
    ///
    /// The unique index on `idempotency_key` makes lookup-and-insert atomic: a
    /// concurrent insert with the same key fails here and the existing row is
    /// returned instead.
    pub async fn insert_submission(&self, new: NewSignUp) -> AppResult<InsertOutcome> {
        let has_image = new.bet_slip_image_ref.is_some();
        let extraction_status = if has_image {
            ExtractionStatus::Pending
        } else {
            ExtractionStatus::None
        };
        let now = new.submitted_at;

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let model = ActiveModel {
            id: Set(new.id),
            idempotency_key: Set(new.idempotency_key),
            ambassador_id: Set(new.ambassador_id),
            event_id: Set(new.event_id),
            solo_chat_id: Set(new.solo_chat_id),
            operator_id: Set(new.operator_id),
            customer_name: Set(new.customer_name),
            customer_email: Set(new.customer_email),
            customer_phone: Set(new.customer_phone),
            customer_state: Set(new.customer_state),
            cpa_amount_cents: Set(new.cpa_amount_cents),
            bet_slip_image_ref: Set(new.bet_slip_image_ref.clone()),
            bet_slip_content_type: Set(new.bet_slip_content_type.clone()),
            bet_amount_cents: Set(None),
            team_bet_on: Set(None),
            odds: Set(None),
            extraction_confidence: Set(None),
            extraction_status: Set(extraction_status.as_str().to_string()),
            extraction_details: Set(None),
            review_status: Set(ReviewStatus::Pending.as_str().to_string()),
            resolved_by: Set(None),
            resolved_at: Set(None),
            resolution_notes: Set(None),
            submitted_at: Set(now),
            updated_at: Set(now),
        };

        let sign_up = match model.insert(&txn).await {
            Ok(sign_up) => sign_up,
            Err(e) if is_unique_violation(&e) => {
                txn.rollback()
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to roll back: {}", e)))?;

                debug!(
                    "Idempotency key {} inserted concurrently, returning existing sign-up",
                    new.idempotency_key
                );
                let existing = self
                    .find_sign_up_by_idempotency_key(new.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(format!(
                            "Unique violation for sign-up {} without a matching idempotency key",
                            new.id
                        ))
                    })?;
                return Ok(InsertOutcome::Existing(existing));
            }
            Err(e) => {
                return Err(AppError::Database(format!("Failed to insert sign-up: {}", e)));
            }
        };

        audit_log::append(
            &txn,
            NewAuditEntry::new(sign_up.id, AuditAction::SignUpSubmitted)
                .actor(sign_up.ambassador_id)
                .details(json!({
                    "operatorId": sign_up.operator_id,
                    "cpaAmountCents": sign_up.cpa_amount_cents,
                    "idempotencyKey": sign_up.idempotency_key,
                    "betSlipImageRef": sign_up.bet_slip_image_ref,
                    "betSlipSha256": new.bet_slip_sha256,
                })),
            now,
        )
        .await?;

        let job = if has_image {
            let job = extraction_job::ActiveModel {
                id: Set(Uuid::now_v7()),
                sign_up_id: Set(sign_up.id),
                status: Set(JobStatus::Pending.as_str().to_string()),
                attempt_count: Set(0),
                max_attempts: Set(MAX_EXTRACTION_ATTEMPTS),
                next_attempt_at: Set(now),
                last_error: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert extraction job: {}", e)))?;

            audit_log::append(
                &txn,
                NewAuditEntry::new(sign_up.id, AuditAction::ExtractionJobCreated)
                    .details(json!({ "jobId": job.id, "maxAttempts": job.max_attempts })),
                now,
            )
            .await?;

            Some(job)
        } else {
            None
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit sign-up: {}", e)))?;

        info!(
            sign_up_id = %sign_up.id,
            operator_id = %sign_up.operator_id,
            job_id = ?job.as_ref().map(|j| j.id),
            "Sign-up persisted"
        );

        Ok(InsertOutcome::Created { sign_up, job })
    }

    /// Sign-ups awaiting human resolution, in priority order.
    ///
    /// Order: missing critical field first, then lowest confidence (NULL as 0),
    /// then oldest submission. Returns the page and the total count.
    pub async fn list_review_queue(
        &self,
        query: &ReviewQuery,
    ) -> AppResult<(Vec<sign_up::Model>, u64)> {
        let mut select = SignUp::find()
            .filter(sign_up::Column::ReviewStatus.eq(ReviewStatus::Pending.as_str()))
            .filter(sign_up::Column::ExtractionStatus.is_in([
                ExtractionStatus::Completed.as_str(),
                ExtractionStatus::Failed.as_str(),
            ]));

        if let Some(operator_id) = query.operator_id {
            select = select.filter(sign_up::Column::OperatorId.eq(operator_id));
        }

        if let Some(missing) = query.missing_fields {
            select = select.filter(missing_field_condition(missing));
        }

        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count review queue: {}", e)))?;

        let rows = select
            .order_by(Expr::cust(MISSING_CRITICAL_FIELD_KEY), Order::Asc)
            .order_by(Expr::cust(CONFIDENCE_KEY), Order::Asc)
            .order_by_asc(sign_up::Column::SubmittedAt)
            .order_by_asc(sign_up::Column::Id)
            .offset(query.offset())
            .limit(query.page_size())
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list review queue: {}", e)))?;

        Ok((rows, total))
    }

    /// Apply a review resolution if the sign-up is still in `expected`.
    ///
    /// The update is conditional on the current review status, so two reviewers
    /// racing on the same sign-up cannot both win. Returns `None` when the
    /// status no longer matches.
    pub async fn apply_review_resolution(
        &self,
        sign_up_id: Uuid,
        expected: ReviewStatus,
        resolution: ReviewResolution,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> AppResult<Option<sign_up::Model>> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut update = ActiveModel {
            review_status: Set(resolution.status.as_str().to_string()),
            resolved_by: Set(Some(resolution.resolved_by)),
            resolved_at: Set(Some(now)),
            resolution_notes: Set(resolution.resolution_notes),
            updated_at: Set(now),
            ..Default::default()
        };
        if let Some(fields) = resolution.final_fields {
            update.bet_amount_cents = Set(fields.bet_amount_cents);
            update.team_bet_on = Set(fields.team_bet_on);
            update.odds = Set(fields.odds);
        }

        let result = SignUp::update_many()
            .set(update)
            .filter(sign_up::Column::Id.eq(sign_up_id))
            .filter(sign_up::Column::ReviewStatus.eq(expected.as_str()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to resolve sign-up: {}", e)))?;

        if result.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(format!("Failed to roll back: {}", e)))?;
            return Ok(None);
        }

        audit_log::append(&txn, audit, now).await?;

        let updated = SignUp::find_by_id(sign_up_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to reload sign-up: {}", e)))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit resolution: {}", e)))?;

        Ok(updated)
    }
}

fn missing_field_condition(missing: MissingField) -> Condition {
    match missing {
        MissingField::BetAmount => Condition::all().add(sign_up::Column::BetAmountCents.is_null()),
        MissingField::TeamBetOn => Condition::all().add(sign_up::Column::TeamBetOn.is_null()),
        MissingField::Odds => Condition::all().add(sign_up::Column::Odds.is_null()),
        MissingField::Any => Condition::any()
            .add(sign_up::Column::BetAmountCents.is_null())
            .add(sign_up::Column::TeamBetOn.is_null())
            .add(sign_up::Column::Odds.is_null()),
    }
}
