//! Database queries for the extraction job queue.
//!
//! Every transition out of `processing` is conditional on the job still being
//! in `processing`. A worker whose job was reset by the stuck-job sweep (and
//! possibly claimed again elsewhere) therefore cannot overwrite the newer state.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::extraction_job::{self, Entity as ExtractionJob};
use crate::entity::sign_up::{self, Entity as SignUp};
use crate::error::{AppError, AppResult};
use crate::models::{AuditAction, ExtractionStatus, JobStats, JobStatus, PendingJob};

use super::DbPool;
use super::audit_log::{self, NewAuditEntry};

/// Fields written to the sign-up when an extraction succeeds.
#[derive(Debug, Clone)]
pub struct ExtractedFields {
    pub bet_amount_cents: Option<i64>,
    pub team_bet_on: Option<String>,
    pub odds: Option<String>,
    pub confidence: f64,
    pub details: Option<JsonValue>,
}

impl DbPool {
    /// Get the extraction job of a sign-up.
    pub async fn get_job_by_sign_up_id(
        &self,
        sign_up_id: Uuid,
    ) -> AppResult<Option<extraction_job::Model>> {
        ExtractionJob::find()
            .filter(extraction_job::Column::SignUpId.eq(sign_up_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get extraction job: {}", e)))
    }

    /// Pending jobs whose `next_attempt_at` has passed, oldest due first.
    pub async fn get_pending_jobs(
        &self,
        limit: u64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingJob>> {
        let rows = ExtractionJob::find()
            .filter(extraction_job::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(extraction_job::Column::NextAttemptAt.lte(now))
            .order_by_asc(extraction_job::Column::NextAttemptAt)
            .order_by_asc(extraction_job::Column::CreatedAt)
            .limit(limit)
            .find_also_related(SignUp)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get pending jobs: {}", e)))?;

        let jobs = rows
            .into_iter()
            .filter_map(|(job, sign_up)| {
                let Some(sign_up) = sign_up else {
                    warn!("Extraction job {} has no sign-up, skipping", job.id);
                    return None;
                };
                Some(PendingJob {
                    job_id: job.id,
                    sign_up_id: job.sign_up_id,
                    attempt_count: job.attempt_count,
                    max_attempts: job.max_attempts,
                    next_attempt_at: job.next_attempt_at,
                    created_at: job.created_at,
                    image_ref: sign_up.bet_slip_image_ref,
                    content_type: sign_up.bet_slip_content_type,
                    operator_id: sign_up.operator_id,
                    customer_email: sign_up.customer_email,
                })
            })
            .collect();

        Ok(jobs)
    }

    /// Move a job from `pending` to `processing`.
    ///
    /// The update only matches the row `job` was read from: still pending,
    /// same attempt count and due by `now`. A snapshot that went stale because
    /// another worker claimed, failed and rescheduled the job in the meantime
    /// loses the claim. Returns `false` in that case.
    pub async fn claim_job(&self, job: &PendingJob, now: DateTime<Utc>) -> AppResult<bool> {
        let txn = self.begin().await?;

        let result = ExtractionJob::update_many()
            .col_expr(
                extraction_job::Column::Status,
                Expr::value(JobStatus::Processing.as_str()),
            )
            .col_expr(extraction_job::Column::UpdatedAt, Expr::value(now))
            .filter(extraction_job::Column::Id.eq(job.job_id))
            .filter(extraction_job::Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(extraction_job::Column::AttemptCount.eq(job.attempt_count))
            .filter(extraction_job::Column::NextAttemptAt.lte(now))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to claim job: {}", e)))?;

        if result.rows_affected == 0 {
            rollback(txn).await?;
            debug!(
                "Job {} already claimed or rescheduled since attempt {}",
                job.job_id, job.attempt_count
            );
            return Ok(false);
        }

        set_sign_up_extraction_status(&txn, job.sign_up_id, ExtractionStatus::Processing, now)
            .await?;
        commit(txn).await?;

        Ok(true)
    }

    /// Record a successful extraction.
    ///
    /// Writes the extracted fields and confidence; the commission amount is
    /// never touched. Returns `false` if the job is no longer in `processing`.
    pub async fn complete_extraction(
        &self,
        job_id: Uuid,
        sign_up_id: Uuid,
        fields: ExtractedFields,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let txn = self.begin().await?;

        if !transition_job(&txn, job_id, JobStatus::Completed, None, None, None, now).await? {
            rollback(txn).await?;
            return Ok(false);
        }

        let update = sign_up::ActiveModel {
            bet_amount_cents: Set(fields.bet_amount_cents),
            team_bet_on: Set(fields.team_bet_on.clone()),
            odds: Set(fields.odds.clone()),
            extraction_confidence: Set(Some(fields.confidence)),
            extraction_status: Set(ExtractionStatus::Completed.as_str().to_string()),
            extraction_details: Set(fields.details),
            updated_at: Set(now),
            ..Default::default()
        };
        SignUp::update_many()
            .set(update)
            .filter(sign_up::Column::Id.eq(sign_up_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to store extraction: {}", e)))?;

        audit_log::append(
            &txn,
            NewAuditEntry::new(sign_up_id, AuditAction::ExtractionSucceeded).details(json!({
                "jobId": job_id,
                "confidence": fields.confidence,
                "betAmountCents": fields.bet_amount_cents,
                "teamBetOn": fields.team_bet_on,
                "odds": fields.odds,
            })),
            now,
        )
        .await?;

        commit(txn).await?;
        Ok(true)
    }

    /// Return a failed attempt to the queue with a later `next_attempt_at`.
    pub async fn schedule_extraction_retry(
        &self,
        job_id: Uuid,
        sign_up_id: Uuid,
        attempt_count: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let txn = self.begin().await?;

        let moved = transition_job(
            &txn,
            job_id,
            JobStatus::Pending,
            Some(attempt_count),
            Some(next_attempt_at),
            Some(error),
            now,
        )
        .await?;
        if !moved {
            rollback(txn).await?;
            return Ok(false);
        }

        set_sign_up_extraction_status(&txn, sign_up_id, ExtractionStatus::Pending, now).await?;

        audit_log::append(
            &txn,
            NewAuditEntry::new(sign_up_id, AuditAction::ExtractionRetryScheduled).details(json!({
                "jobId": job_id,
                "attempt": attempt_count,
                "nextAttemptAt": next_attempt_at,
                "error": error,
            })),
            now,
        )
        .await?;

        commit(txn).await?;
        Ok(true)
    }

    /// Mark a job and its sign-up as failed. The sign-up enters the review
    /// queue with no extracted fields.
    pub async fn fail_extraction(
        &self,
        job_id: Uuid,
        sign_up_id: Uuid,
        attempt_count: i32,
        error: &str,
        details: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let txn = self.begin().await?;

        let moved = transition_job(
            &txn,
            job_id,
            JobStatus::Failed,
            Some(attempt_count),
            None,
            Some(error),
            now,
        )
        .await?;
        if !moved {
            rollback(txn).await?;
            return Ok(false);
        }

        let update = sign_up::ActiveModel {
            extraction_status: Set(ExtractionStatus::Failed.as_str().to_string()),
            extraction_details: Set(details),
            updated_at: Set(now),
            ..Default::default()
        };
        SignUp::update_many()
            .set(update)
            .filter(sign_up::Column::Id.eq(sign_up_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to mark sign-up failed: {}", e)))?;

        audit_log::append(
            &txn,
            NewAuditEntry::new(sign_up_id, AuditAction::ExtractionFailed).details(json!({
                "jobId": job_id,
                "attempts": attempt_count,
                "error": error,
            })),
            now,
        )
        .await?;

        commit(txn).await?;
        Ok(true)
    }

    /// Reset jobs stuck in `processing` since before `cutoff` back to `pending`.
    ///
    /// The attempt count is left unchanged. Each reset repeats the full
    /// stuck predicate, so a job that a live worker finished or re-claimed
    /// after the scan is left alone, and only sign-ups whose job was actually
    /// reset go back to `pending`. Running this twice is harmless.
    pub async fn reset_stuck_jobs(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let txn = self.begin().await?;

        let stuck: Vec<(Uuid, Uuid)> = ExtractionJob::find()
            .select_only()
            .column(extraction_job::Column::Id)
            .column(extraction_job::Column::SignUpId)
            .filter(extraction_job::Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(extraction_job::Column::UpdatedAt.lt(cutoff))
            .into_tuple()
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to find stuck jobs: {}", e)))?;

        if stuck.is_empty() {
            rollback(txn).await?;
            return Ok(0);
        }

        let mut reset = 0;
        for (job_id, sign_up_id) in stuck {
            let result = ExtractionJob::update_many()
                .col_expr(
                    extraction_job::Column::Status,
                    Expr::value(JobStatus::Pending.as_str()),
                )
                .col_expr(extraction_job::Column::NextAttemptAt, Expr::value(now))
                .col_expr(extraction_job::Column::UpdatedAt, Expr::value(now))
                .filter(extraction_job::Column::Id.eq(job_id))
                .filter(extraction_job::Column::Status.eq(JobStatus::Processing.as_str()))
                .filter(extraction_job::Column::UpdatedAt.lt(cutoff))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to reset stuck job: {}", e)))?;

            if result.rows_affected == 0 {
                debug!("Job {} moved on before it could be reset", job_id);
                continue;
            }

            SignUp::update_many()
                .col_expr(
                    sign_up::Column::ExtractionStatus,
                    Expr::value(ExtractionStatus::Pending.as_str()),
                )
                .col_expr(sign_up::Column::UpdatedAt, Expr::value(now))
                .filter(sign_up::Column::Id.eq(sign_up_id))
                .filter(
                    sign_up::Column::ExtractionStatus.eq(ExtractionStatus::Processing.as_str()),
                )
                .exec(&txn)
                .await
                .map_err(|e| {
                    AppError::Database(format!("Failed to reset stuck sign-up: {}", e))
                })?;

            reset += 1;
        }

        commit(txn).await?;

        if reset > 0 {
            info!("Reset {} stuck extraction jobs", reset);
        }
        Ok(reset)
    }

    /// Job counts per status and mean confidence of completed extractions.
    pub async fn job_stats(&self) -> AppResult<JobStats> {
        let mut stats = JobStats::default();

        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let count = ExtractionJob::find()
                .filter(extraction_job::Column::Status.eq(status.as_str()))
                .count(self.connection())
                .await
                .map_err(|e| AppError::Database(format!("Failed to count jobs: {}", e)))?;

            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }

        let avg: Option<Option<f64>> = SignUp::find()
            .select_only()
            .column_as(Expr::cust("AVG(extraction_confidence)"), "avg_confidence")
            .filter(sign_up::Column::ExtractionStatus.eq(ExtractionStatus::Completed.as_str()))
            .into_tuple()
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to average confidence: {}", e)))?;

        stats.avg_confidence = avg.flatten().map(|v| (v * 100.0).round() / 100.0);
        Ok(stats)
    }

    async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
    }
}

/// Move a job out of `processing`. Returns `false` if it was not in `processing`.
async fn transition_job(
    txn: &DatabaseTransaction,
    job_id: Uuid,
    status: JobStatus,
    attempt_count: Option<i32>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let mut update = extraction_job::ActiveModel {
        status: Set(status.as_str().to_string()),
        last_error: Set(last_error.map(str::to_string)),
        updated_at: Set(now),
        ..Default::default()
    };
    if let Some(attempt_count) = attempt_count {
        update.attempt_count = Set(attempt_count);
    }
    if let Some(next_attempt_at) = next_attempt_at {
        update.next_attempt_at = Set(next_attempt_at);
    }

    let result = ExtractionJob::update_many()
        .set(update)
        .filter(extraction_job::Column::Id.eq(job_id))
        .filter(extraction_job::Column::Status.eq(JobStatus::Processing.as_str()))
        .exec(txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update job {}: {}", job_id, e)))?;

    if result.rows_affected == 0 {
        warn!(
            "Job {} left processing before it could move to {}",
            job_id, status
        );
        return Ok(false);
    }
    Ok(true)
}

async fn set_sign_up_extraction_status(
    txn: &DatabaseTransaction,
    sign_up_id: Uuid,
    status: ExtractionStatus,
    now: DateTime<Utc>,
) -> AppResult<()> {
    SignUp::update_many()
        .col_expr(sign_up::Column::ExtractionStatus, Expr::value(status.as_str()))
        .col_expr(sign_up::Column::UpdatedAt, Expr::value(now))
        .filter(sign_up::Column::Id.eq(sign_up_id))
        .exec(txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to update sign-up status: {}", e)))?;
    Ok(())
}

async fn commit(txn: DatabaseTransaction) -> AppResult<()> {
    txn.commit()
        .await
        .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))
}

async fn rollback(txn: DatabaseTransaction) -> AppResult<()> {
    txn.rollback()
        .await
        .map_err(|e| AppError::Database(format!("Failed to roll back transaction: {}", e)))
}
