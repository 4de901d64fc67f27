//! Confirmation workflow for reviewed sign-ups.
//!
//! `pending -> confirmed` and `pending | skipped -> skipped` are the only legal
//! moves. Both go through a conditional update on the status that was read, so
//! a concurrent resolution of the same sign-up is rejected rather than lost.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue, json};
use tracing::info;
use uuid::Uuid;

use crate::db::DbPool;
use crate::db::audit_log::NewAuditEntry;
use crate::db::sign_ups::{FinalFields, ReviewResolution};
use crate::entity::sign_up;
use crate::error::{AppError, AppResult};
use crate::models::{
    AuditAction, ConfirmRequest, Corrections, DEFAULT_SKIP_REASON, ExtractionStatus,
    ReviewStatus, SignUp, SkipRequest, cents_to_decimal, decimal_to_cents,
};

const MAX_NOTES_LEN: usize = 2000;

/// Confirm a sign-up, applying any reviewer corrections.
pub async fn confirm(
    pool: &DbPool,
    sign_up_id: Uuid,
    request: ConfirmRequest,
    reviewer_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<SignUp> {
    let current = load(pool, sign_up_id).await?;
    let status = review_status(&current)?;

    if !status.can_transition_to(ReviewStatus::Confirmed) {
        return Err(AppError::InvalidTransition(format!(
            "cannot confirm a sign-up that is {}",
            status
        )));
    }

    if matches!(
        ExtractionStatus::parse(&current.extraction_status),
        Some(ExtractionStatus::Pending | ExtractionStatus::Processing)
    ) {
        return Err(AppError::InvalidTransition(
            "cannot confirm while extraction is still in progress".to_string(),
        ));
    }

    let corrections = request.corrections.unwrap_or_default();
    let corrected_amount = match corrections.bet_amount {
        Some(amount) => Some(amount_to_cents(amount)?),
        None => None,
    };
    let corrected_team = non_empty(corrections.team_bet_on.clone(), "teamBetOn")?;
    let corrected_odds = non_empty(corrections.odds.clone(), "odds")?;
    let notes = notes(request.notes)?;

    let final_fields = FinalFields {
        bet_amount_cents: corrected_amount.or(current.bet_amount_cents),
        team_bet_on: corrected_team.or_else(|| current.team_bet_on.clone()),
        odds: corrected_odds.or_else(|| current.odds.clone()),
    };

    let audit = NewAuditEntry::new(sign_up_id, AuditAction::ReviewConfirmed)
        .actor(reviewer_id)
        .details(json!({
            "previousStatus": status.as_str(),
            "corrections": correction_changes(&current, &corrections, &final_fields),
            "notes": notes,
        }));

    let resolution = ReviewResolution {
        status: ReviewStatus::Confirmed,
        resolved_by: reviewer_id,
        resolution_notes: notes,
        final_fields: Some(final_fields),
    };

    let updated = pool
        .apply_review_resolution(sign_up_id, status, resolution, audit, now)
        .await?
        .ok_or_else(concurrent_resolution)?;

    info!(
        sign_up_id = %sign_up_id,
        reviewer_id = %reviewer_id,
        corrected = !corrections.is_empty(),
        "Sign-up confirmed"
    );

    SignUp::try_from(updated)
}

/// Skip a sign-up. A missing or blank reason records the default placeholder.
pub async fn skip(
    pool: &DbPool,
    sign_up_id: Uuid,
    request: SkipRequest,
    reviewer_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<SignUp> {
    let current = load(pool, sign_up_id).await?;
    let status = review_status(&current)?;

    if !status.can_transition_to(ReviewStatus::Skipped) {
        return Err(AppError::InvalidTransition(format!(
            "cannot skip a sign-up that is {}",
            status
        )));
    }

    let reason = notes(request.reason)?.unwrap_or_else(|| DEFAULT_SKIP_REASON.to_string());

    let audit = NewAuditEntry::new(sign_up_id, AuditAction::ReviewSkipped)
        .actor(reviewer_id)
        .details(json!({
            "previousStatus": status.as_str(),
            "previousReason": current.resolution_notes,
            "reason": reason,
        }));

    let resolution = ReviewResolution {
        status: ReviewStatus::Skipped,
        resolved_by: reviewer_id,
        resolution_notes: Some(reason),
        final_fields: None,
    };

    let updated = pool
        .apply_review_resolution(sign_up_id, status, resolution, audit, now)
        .await?
        .ok_or_else(concurrent_resolution)?;

    info!(sign_up_id = %sign_up_id, reviewer_id = %reviewer_id, "Sign-up skipped");

    SignUp::try_from(updated)
}

async fn load(pool: &DbPool, sign_up_id: Uuid) -> AppResult<sign_up::Model> {
    pool.get_sign_up_by_id(sign_up_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sign-up {}", sign_up_id)))
}

fn review_status(model: &sign_up::Model) -> AppResult<ReviewStatus> {
    ReviewStatus::parse(&model.review_status).ok_or_else(|| {
        AppError::Database(format!(
            "Sign-up {} has unknown review status '{}'",
            model.id, model.review_status
        ))
    })
}

fn concurrent_resolution() -> AppError {
    AppError::InvalidTransition("sign-up was resolved concurrently".to_string())
}

fn amount_to_cents(amount: Decimal) -> AppResult<i64> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(
            "corrections.betAmount must be positive".to_string(),
        ));
    }
    decimal_to_cents(amount)
        .ok_or_else(|| AppError::Validation("corrections.betAmount is out of range".to_string()))
}

fn non_empty(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(AppError::Validation(format!(
            "corrections.{} must not be blank",
            field
        ))),
        other => Ok(other),
    }
}

fn notes(value: Option<String>) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > MAX_NOTES_LEN => Err(AppError::Validation(format!(
            "notes must be at most {} characters",
            MAX_NOTES_LEN
        ))),
        other => Ok(other),
    }
}

/// `{field: {before, after}}` for each corrected field.
fn correction_changes(
    current: &sign_up::Model,
    corrections: &Corrections,
    final_fields: &FinalFields,
) -> JsonValue {
    let mut changes = Map::new();

    if corrections.bet_amount.is_some() {
        changes.insert(
            "betAmount".to_string(),
            json!({
                "before": current.bet_amount_cents.map(cents_to_decimal),
                "after": final_fields.bet_amount_cents.map(cents_to_decimal),
            }),
        );
    }
    if corrections.team_bet_on.is_some() {
        changes.insert(
            "teamBetOn".to_string(),
            json!({ "before": current.team_bet_on, "after": final_fields.team_bet_on }),
        );
    }
    if corrections.odds.is_some() {
        changes.insert(
            "odds".to_string(),
            json!({ "before": current.odds, "after": final_fields.odds }),
        );
    }

    JsonValue::Object(changes)
}
