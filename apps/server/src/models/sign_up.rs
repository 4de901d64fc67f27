//! Sign-up domain models and DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::sign_up;
use crate::error::{AppError, AppResult};

use super::extraction::ExtractionDetails;

/// Extraction status carried on the sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// No bet-slip image was submitted.
    None,
    /// Job queued, waiting for a worker (or a retry).
    Pending,
    /// A worker holds the job.
    Processing,
    /// Fields extracted.
    Completed,
    /// Attempt budget exhausted.
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human review status.
///
/// `Confirmed` is terminal. `Skipped` may be skipped again (to update the
/// reason) but never returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Confirmed,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether a reviewer may move a sign-up from `self` to `next`.
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Skipped)
                | (Self::Skipped, Self::Skipped)
        )
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the conversion happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignUpChannel {
    Event,
    Solo,
}

impl SignUpChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Solo => "solo",
        }
    }
}

/// Convert stored minor units to a two-place decimal.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Convert a decimal amount to minor units, rounding to two places.
/// Returns `None` when the value does not fit in an `i64`.
pub fn decimal_to_cents(amount: Decimal) -> Option<i64> {
    (amount.round_dp(2) * Decimal::ONE_HUNDRED).to_i64()
}

/// Sign-up as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub id: Uuid,
    pub idempotency_key: Uuid,
    pub ambassador_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solo_chat_id: Option<Uuid>,
    pub operator_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_state: Option<String>,
    /// Commission rate locked at submission.
    pub cpa_amount: Decimal,
    pub bet_slip_image_ref: Option<String>,
    pub bet_slip_content_type: Option<String>,
    pub bet_amount: Option<Decimal>,
    pub team_bet_on: Option<String>,
    pub odds: Option<String>,
    /// 0-100 with two decimal places.
    pub extraction_confidence: Option<f64>,
    pub extraction_status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_details: Option<ExtractionDetails>,
    pub review_status: ReviewStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SignUp {
    /// Critical fields the extraction did not resolve, in display order.
    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.bet_amount.is_none() {
            missing.push(MissingField::BetAmount);
        }
        if self.team_bet_on.is_none() {
            missing.push(MissingField::TeamBetOn);
        }
        if self.odds.is_none() {
            missing.push(MissingField::Odds);
        }
        missing
    }
}

impl TryFrom<sign_up::Model> for SignUp {
    type Error = AppError;

    fn try_from(model: sign_up::Model) -> AppResult<Self> {
        let extraction_status = ExtractionStatus::parse(&model.extraction_status).ok_or_else(|| {
            AppError::Database(format!(
                "Sign-up {} has unknown extraction status '{}'",
                model.id, model.extraction_status
            ))
        })?;
        let review_status = ReviewStatus::parse(&model.review_status).ok_or_else(|| {
            AppError::Database(format!(
                "Sign-up {} has unknown review status '{}'",
                model.id, model.review_status
            ))
        })?;

        Ok(SignUp {
            id: model.id,
            idempotency_key: model.idempotency_key,
            ambassador_id: model.ambassador_id,
            event_id: model.event_id,
            solo_chat_id: model.solo_chat_id,
            operator_id: model.operator_id,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            customer_state: model.customer_state,
            cpa_amount: cents_to_decimal(model.cpa_amount_cents),
            bet_slip_image_ref: model.bet_slip_image_ref,
            bet_slip_content_type: model.bet_slip_content_type,
            bet_amount: model.bet_amount_cents.map(cents_to_decimal),
            team_bet_on: model.team_bet_on,
            odds: model.odds,
            extraction_confidence: model.extraction_confidence,
            extraction_status,
            extraction_details: ExtractionDetails::from_json(model.extraction_details.as_ref()),
            review_status,
            resolved_by: model.resolved_by,
            resolved_at: model.resolved_at,
            resolution_notes: model.resolution_notes,
            submitted_at: model.submitted_at,
        })
    }
}

/// Critical extraction field, also used as a review-queue filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissingField {
    BetAmount,
    TeamBetOn,
    Odds,
    /// Any of the three.
    Any,
}

/// Request body for `POST /signups/event` and `POST /signups/solo`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignUpRequest {
    pub operator_id: Uuid,
    /// Required on the event route, rejected on the solo route.
    #[serde(default)]
    pub event_id: Option<Uuid>,
    /// Required on the solo route, rejected on the event route.
    #[serde(default)]
    pub solo_chat_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_state: Option<String>,
    /// Client-generated v4 UUID, kept as a string so malformed values
    /// surface as a validation error.
    pub idempotency_key: String,
    /// Base64 image, optionally as a `data:` URL.
    #[serde(default)]
    pub bet_slip_image: Option<String>,
    #[serde(default)]
    pub bet_slip_content_type: Option<String>,
}

/// Response for a submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSignUpResponse {
    pub sign_up: SignUp,
    /// True when an earlier submission with the same key was returned.
    pub is_idempotent_return: bool,
}
