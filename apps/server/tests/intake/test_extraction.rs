//! Extraction worker: success, retry backoff, attempt ceiling and recovery.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use signup_intake_lib::models::{AuditAction, ExtractionStatus, JobStatus};
use signup_intake_lib::services::{ProcessOutcome, VisionError, recover_stuck_jobs};

use super::test_helpers::*;

fn complete_response() -> serde_json::Value {
    json!({
        "betAmount": "$50.00",
        "teamBetOn": "Chiefs",
        "odds": "-110",
        "confidence": 88.5,
        "fieldConfidence": { "betAmount": 95, "teamBetOn": 90, "odds": 80 }
    })
}

#[actix_rt::test]
async fn test_successful_extraction_populates_fields() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "win@example.com", Utc::now()).await;

    let outcome = extract_with(&ctx, sign_up.id, complete_response()).await;
    assert_eq!(outcome, ProcessOutcome::Completed { confidence: 88.5 });

    let updated = reload(&ctx.pool, sign_up.id).await;
    assert_eq!(updated.extraction_status, ExtractionStatus::Completed);
    assert_eq!(updated.bet_amount, Some(Decimal::new(5_000, 2)));
    assert_eq!(updated.team_bet_on.as_deref(), Some("Chiefs"));
    assert_eq!(updated.odds.as_deref(), Some("-110"));
    assert_eq!(updated.extraction_confidence, Some(88.5));
    // Extraction never touches the frozen commission
    assert_eq!(updated.cpa_amount, sign_up.cpa_amount);

    let details = updated.extraction_details.expect("details should be stored");
    assert_eq!(details.field_confidence.bet_amount, 95.0);
    assert!(details.warnings.is_empty());

    let job = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed.as_str());

    // Completed jobs are never fetched again
    assert!(pending_job(&ctx.pool, sign_up.id).await.is_none());
}

#[actix_rt::test]
async fn test_missing_field_lowers_confidence() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "partial@example.com", Utc::now()).await;

    let outcome = extract_with(
        &ctx,
        sign_up.id,
        json!({ "teamBetOn": "Lakers", "odds": "+150", "confidence": 90 }),
    )
    .await;
    assert_eq!(outcome, ProcessOutcome::Completed { confidence: 65.0 });

    let updated = reload(&ctx.pool, sign_up.id).await;
    assert!(updated.bet_amount.is_none());
    let details = updated.extraction_details.unwrap();
    assert_eq!(details.warnings, vec!["bet amount not detected".to_string()]);
}

#[actix_rt::test]
async fn test_failed_attempt_schedules_backoff() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "retry@example.com", Utc::now()).await;

    ctx.vision
        .push_err(VisionError::ServiceUnavailable("503".to_string()));
    let outcome = run_attempt(&ctx, sign_up.id).await;
    assert_eq!(
        outcome,
        ProcessOutcome::RetryScheduled {
            attempt: 1,
            delay: StdDuration::from_secs(5)
        }
    );

    let job = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.next_attempt_at - job.updated_at, Duration::seconds(5));
    assert!(job.last_error.unwrap().contains("503"));

    // Not due yet
    let due_now = ctx.pool.get_pending_jobs(10, Utc::now()).await.unwrap();
    assert!(due_now.iter().all(|j| j.sign_up_id != sign_up.id));

    assert_eq!(
        reload(&ctx.pool, sign_up.id).await.extraction_status,
        ExtractionStatus::Pending
    );

    // Second failure waits five times longer
    ctx.vision.push_err(VisionError::Timeout(30_000));
    let outcome = run_attempt(&ctx, sign_up.id).await;
    assert_eq!(
        outcome,
        ProcessOutcome::RetryScheduled {
            attempt: 2,
            delay: StdDuration::from_secs(25)
        }
    );
}

#[actix_rt::test]
async fn test_job_fails_after_three_attempts() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "ceiling@example.com", Utc::now()).await;

    for _ in 0..3 {
        ctx.vision
            .push_err(VisionError::ImageProcessingFailed("unreadable".to_string()));
    }

    assert!(matches!(
        run_attempt(&ctx, sign_up.id).await,
        ProcessOutcome::RetryScheduled { attempt: 1, .. }
    ));
    assert!(matches!(
        run_attempt(&ctx, sign_up.id).await,
        ProcessOutcome::RetryScheduled { attempt: 2, .. }
    ));
    assert_eq!(
        run_attempt(&ctx, sign_up.id).await,
        ProcessOutcome::Failed { attempt: 3 }
    );
    assert_eq!(ctx.vision.calls(), 3);

    let job = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed.as_str());
    assert_eq!(job.attempt_count, 3);
    assert!(pending_job(&ctx.pool, sign_up.id).await.is_none());

    let updated = reload(&ctx.pool, sign_up.id).await;
    assert_eq!(updated.extraction_status, ExtractionStatus::Failed);
    let details = updated.extraction_details.unwrap();
    assert!(details.last_error.unwrap().contains("unreadable"));

    let actions: Vec<String> = ctx
        .pool
        .list_audit_entries(sign_up.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions
            .iter()
            .filter(|a| *a == AuditAction::ExtractionRetryScheduled.as_str())
            .count(),
        2
    );
    assert_eq!(
        actions.last().map(String::as_str),
        Some(AuditAction::ExtractionFailed.as_str())
    );
}

#[actix_rt::test]
async fn test_missing_image_fails_without_retry() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "gone@example.com", Utc::now()).await;

    ctx.images
        .remove(sign_up.bet_slip_image_ref.as_deref().unwrap());

    let outcome = run_attempt(&ctx, sign_up.id).await;
    assert_eq!(outcome, ProcessOutcome::Failed { attempt: 1 });
    // The vision service is never called for a missing image
    assert_eq!(ctx.vision.calls(), 0);
    assert_eq!(
        reload(&ctx.pool, sign_up.id).await.extraction_status,
        ExtractionStatus::Failed
    );
}

#[actix_rt::test]
async fn test_claim_is_exclusive() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "claim@example.com", Utc::now()).await;
    let job = pending_job(&ctx.pool, sign_up.id).await.unwrap();

    let first = ctx.pool.claim_job(&job, Utc::now()).await.unwrap();
    let second = ctx.pool.claim_job(&job, Utc::now()).await.unwrap();
    assert!(first);
    assert!(!second);

    // A worker holding a stale snapshot skips the job
    assert_eq!(
        ctx.worker.process_one(&job).await.unwrap(),
        ProcessOutcome::Skipped
    );
    assert_eq!(ctx.vision.calls(), 0);
}

#[actix_rt::test]
async fn test_stale_snapshot_cannot_reclaim_rescheduled_job() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "double@example.com", Utc::now()).await;

    // Two workers fetched the same due job
    let first_copy = pending_job(&ctx.pool, sign_up.id).await.unwrap();
    let second_copy = first_copy.clone();

    ctx.vision
        .push_err(VisionError::ServiceUnavailable("503".to_string()));
    assert!(matches!(
        ctx.worker.process_one(&first_copy).await.unwrap(),
        ProcessOutcome::RetryScheduled { attempt: 1, .. }
    ));

    // The job is pending again, but the second copy predates the retry
    ctx.vision.push_ok(complete_response());
    assert_eq!(
        ctx.worker.process_one(&second_copy).await.unwrap(),
        ProcessOutcome::Skipped
    );
    assert_eq!(ctx.vision.calls(), 1);

    let job = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending.as_str());
    assert_eq!(job.attempt_count, 1);
    assert!(job.next_attempt_at > Utc::now());
}

#[actix_rt::test]
async fn test_due_check_applies_to_claims() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let now = Utc::now();
    let sign_up = submit_event(&ctx, operator, "early@example.com", now).await;
    let job = pending_job(&ctx.pool, sign_up.id).await.unwrap();

    assert!(
        !ctx.pool
            .claim_job(&job, now - Duration::seconds(30))
            .await
            .unwrap()
    );
    assert!(ctx.pool.claim_job(&job, now).await.unwrap());
}

#[actix_rt::test]
async fn test_string_confidence_is_accepted() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "strings@example.com", Utc::now()).await;

    let outcome = extract_with(
        &ctx,
        sign_up.id,
        json!({ "betAmount": 50, "teamBetOn": "Chiefs", "odds": "-110", "confidence": "88.5" }),
    )
    .await;
    assert_eq!(outcome, ProcessOutcome::Completed { confidence: 88.5 });

    let updated = reload(&ctx.pool, sign_up.id).await;
    assert_eq!(updated.bet_amount, Some(Decimal::new(5_000, 2)));
    assert_eq!(updated.team_bet_on.as_deref(), Some("Chiefs"));
    assert_eq!(updated.odds.as_deref(), Some("-110"));
}

#[actix_rt::test]
async fn test_non_object_response_schedules_retry() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let sign_up = submit_event(&ctx, operator, "array@example.com", Utc::now()).await;

    let outcome = extract_with(&ctx, sign_up.id, json!(["not", "an", "object"])).await;
    assert!(matches!(
        outcome,
        ProcessOutcome::RetryScheduled { attempt: 1, .. }
    ));

    let job = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert!(job.last_error.unwrap().contains("image processing failed"));
    assert_eq!(
        reload(&ctx.pool, sign_up.id).await.extraction_status,
        ExtractionStatus::Pending
    );
}

#[actix_rt::test]
async fn test_stuck_jobs_are_reset_once() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let now = Utc::now();
    let sign_up =
        submit_event(&ctx, operator, "stuck@example.com", now - Duration::minutes(15)).await;
    let job = pending_job(&ctx.pool, sign_up.id).await.unwrap();

    assert!(
        ctx.pool
            .claim_job(&job, now - Duration::minutes(10))
            .await
            .unwrap()
    );

    assert_eq!(recover_stuck_jobs(&ctx.pool, now).await.unwrap(), 1);
    assert_eq!(recover_stuck_jobs(&ctx.pool, now).await.unwrap(), 0);

    let reset = ctx.pool.get_job_by_sign_up_id(sign_up.id).await.unwrap().unwrap();
    assert_eq!(reset.status, JobStatus::Pending.as_str());
    assert_eq!(reset.attempt_count, 0);
    assert_eq!(
        reload(&ctx.pool, sign_up.id).await.extraction_status,
        ExtractionStatus::Pending
    );

    // Recovered jobs are picked up again
    assert!(matches!(
        extract_with(&ctx, sign_up.id, complete_response()).await,
        ProcessOutcome::Completed { .. }
    ));
}

#[actix_rt::test]
async fn test_recent_processing_job_is_left_alone() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let now = Utc::now();
    let submitted = now - Duration::minutes(15);

    let stale = submit_event(&ctx, operator, "stale@example.com", submitted).await;
    let busy = submit_event(&ctx, operator, "busy@example.com", submitted).await;
    let stale_job = pending_job(&ctx.pool, stale.id).await.unwrap();
    let busy_job = pending_job(&ctx.pool, busy.id).await.unwrap();

    assert!(
        ctx.pool
            .claim_job(&stale_job, now - Duration::minutes(10))
            .await
            .unwrap()
    );
    assert!(
        ctx.pool
            .claim_job(&busy_job, now - Duration::minutes(1))
            .await
            .unwrap()
    );

    // Only the job past the timeout is reset, and only its sign-up
    assert_eq!(recover_stuck_jobs(&ctx.pool, now).await.unwrap(), 1);

    let still = ctx.pool.get_job_by_sign_up_id(busy.id).await.unwrap().unwrap();
    assert_eq!(still.status, JobStatus::Processing.as_str());
    assert_eq!(
        reload(&ctx.pool, busy.id).await.extraction_status,
        ExtractionStatus::Processing
    );

    let reset = ctx.pool.get_job_by_sign_up_id(stale.id).await.unwrap().unwrap();
    assert_eq!(reset.status, JobStatus::Pending.as_str());
    assert_eq!(
        reload(&ctx.pool, stale.id).await.extraction_status,
        ExtractionStatus::Pending
    );
}

#[actix_rt::test]
async fn test_run_once_processes_due_jobs() {
    let ctx = setup().await;
    let operator = seed_operator(&ctx.pool).await;
    let past = Utc::now() - Duration::minutes(1);
    submit_event(&ctx, operator, "one@example.com", past).await;
    submit_event(&ctx, operator, "two@example.com", past).await;

    ctx.vision.push_ok(complete_response());
    ctx.vision.push_ok(complete_response());

    let outcomes = ctx.worker.run_once(10).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, ProcessOutcome::Completed { .. }))
    );

    let stats = ctx.pool.job_stats().await.unwrap();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.avg_confidence, Some(88.5));
}

#[actix_rt::test]
async fn test_vision_health_reports_backend() {
    let ctx = setup().await;
    assert!(ctx.client.health_check().await.available);
}
