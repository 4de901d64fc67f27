//! Extraction worker.
//!
//! Workers are stateless loops over the durable job queue. The only mutual
//! exclusion is the conditional `pending -> processing` update in
//! `DbPool::claim_job`, which also checks the attempt count the worker read.
//! Any number of workers (in one process or many) can poll the same table.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::WorkerSettings;
use crate::db::DbPool;
use crate::db::extraction_jobs::ExtractedFields;
use crate::error::AppResult;
use crate::models::{
    ExtractionDetails, FieldConfidence, MAX_EXTRACTION_ATTEMPTS, PendingJob, decimal_to_cents,
};

use super::vision::{ExtractOptions, VisionError, VisionExtractionClient};

/// Delay before the second attempt.
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Growth factor between consecutive delays.
pub const BACKOFF_MULTIPLIER: u32 = 5;

/// Content type assumed when a sign-up lost its recorded one.
const FALLBACK_CONTENT_TYPE: &str = "image/jpeg";

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff with a bounded attempt budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: BASE_RETRY_DELAY,
            multiplier: BACKOFF_MULTIPLIER,
            max_attempts: MAX_EXTRACTION_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// `base_delay * multiplier^(attempt - 1)` for a 1-based attempt number.
    pub fn backoff_delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).max(0) as u32;
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor)
    }

    /// Decide after `attempt` (already incremented) failed with `err`.
    pub fn decide(&self, attempt: i32, max_attempts: i32, err: &VisionError) -> RetryDecision {
        let ceiling = max_attempts.min(self.max_attempts);
        if !err.retryable() || attempt >= ceiling {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.backoff_delay(attempt))
        }
    }
}

/// Result of processing one job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed { confidence: f64 },
    RetryScheduled { attempt: i32, delay: Duration },
    Failed { attempt: i32 },
    /// Another worker claimed the job, or it was reset while in flight.
    Skipped,
}

#[derive(Clone)]
pub struct ExtractionWorker {
    pool: DbPool,
    client: VisionExtractionClient,
    policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl ExtractionWorker {
    pub fn new(pool: DbPool, client: VisionExtractionClient) -> Self {
        Self {
            pool,
            client,
            policy: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Override the client's default per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Claim and process one due job.
    pub async fn process_one(&self, job: &PendingJob) -> AppResult<ProcessOutcome> {
        if !self.pool.claim_job(job, Utc::now()).await? {
            return Ok(ProcessOutcome::Skipped);
        }

        debug!(
            job_id = %job.job_id,
            sign_up_id = %job.sign_up_id,
            attempt = job.attempt_count + 1,
            "Processing extraction job"
        );

        let result = match job.image_ref {
            Some(ref image_ref) => {
                let content_type = job.content_type.as_deref().unwrap_or(FALLBACK_CONTENT_TYPE);
                let options = ExtractOptions {
                    timeout: self.timeout,
                };
                self.client.extract(image_ref, content_type, options).await
            }
            None => Err(VisionError::ImageNotFound(format!(
                "sign-up {} has no image reference",
                job.sign_up_id
            ))),
        };

        match result {
            Ok(extraction) => {
                let confidence = extraction.confidence_score;
                let details = ExtractionDetails {
                    field_confidence: extraction.field_confidence,
                    warnings: extraction.warnings,
                    last_error: None,
                    raw_response: extraction.raw_response,
                };
                let fields = ExtractedFields {
                    bet_amount_cents: extraction.bet_amount.and_then(decimal_to_cents),
                    team_bet_on: extraction.team_bet_on,
                    odds: extraction.odds,
                    confidence,
                    details: details.to_json(),
                };

                if !self
                    .pool
                    .complete_extraction(job.job_id, job.sign_up_id, fields, Utc::now())
                    .await?
                {
                    return Ok(ProcessOutcome::Skipped);
                }

                info!(
                    job_id = %job.job_id,
                    sign_up_id = %job.sign_up_id,
                    confidence,
                    "Extraction completed"
                );
                Ok(ProcessOutcome::Completed { confidence })
            }
            Err(err) => self.handle_failure(job, err).await,
        }
    }

    async fn handle_failure(&self, job: &PendingJob, err: VisionError) -> AppResult<ProcessOutcome> {
        let attempt = job.attempt_count + 1;
        let now = Utc::now();
        let message = err.to_string();

        match self.policy.decide(attempt, job.max_attempts, &err) {
            RetryDecision::RetryAfter(delay) => {
                let next_attempt_at = now
                    + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));

                if !self
                    .pool
                    .schedule_extraction_retry(
                        job.job_id,
                        job.sign_up_id,
                        attempt,
                        next_attempt_at,
                        &message,
                        now,
                    )
                    .await?
                {
                    return Ok(ProcessOutcome::Skipped);
                }

                warn!(
                    job_id = %job.job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Extraction attempt failed, retry scheduled: {}",
                    message
                );
                Ok(ProcessOutcome::RetryScheduled { attempt, delay })
            }
            RetryDecision::GiveUp => {
                let details = ExtractionDetails {
                    field_confidence: FieldConfidence::default(),
                    warnings: Vec::new(),
                    last_error: Some(message.clone()),
                    raw_response: serde_json::Value::Null,
                };

                if !self
                    .pool
                    .fail_extraction(
                        job.job_id,
                        job.sign_up_id,
                        attempt,
                        &message,
                        details.to_json(),
                        now,
                    )
                    .await?
                {
                    return Ok(ProcessOutcome::Skipped);
                }

                error!(
                    job_id = %job.job_id,
                    sign_up_id = %job.sign_up_id,
                    attempt,
                    retryable = err.retryable(),
                    "Extraction failed permanently: {}",
                    message
                );
                Ok(ProcessOutcome::Failed { attempt })
            }
        }
    }

    /// Fetch up to `batch_size` due jobs and process them in order.
    pub async fn run_once(&self, batch_size: u64) -> AppResult<Vec<ProcessOutcome>> {
        let jobs = self.pool.get_pending_jobs(batch_size, Utc::now()).await?;
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in &jobs {
            match self.process_one(job).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(job_id = %job.job_id, "Failed to process extraction job: {}", e),
            }
        }

        Ok(outcomes)
    }
}

/// Spawn `settings.concurrency` polling workers.
pub fn start_extraction_workers(
    worker: ExtractionWorker,
    settings: &WorkerSettings,
) -> Vec<JoinHandle<()>> {
    info!(
        "Starting {} extraction workers (poll: {}s, batch: {})",
        settings.concurrency, settings.poll_interval_secs, settings.batch_size
    );

    (0..settings.concurrency.max(1))
        .map(|worker_id| {
            let worker = worker.clone();
            let poll = Duration::from_secs(settings.poll_interval_secs.max(1));
            let batch_size = settings.batch_size.max(1);

            tokio::spawn(async move {
                let mut ticker = interval(poll);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;

                    match worker.run_once(batch_size).await {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            debug!(worker_id, "Processed {} extraction jobs", outcomes.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!(worker_id, "Extraction worker poll failed: {}", e),
                    }
                }
            })
        })
        .collect()
}
