//! Extraction job models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Fixed attempt budget per extraction job.
pub const MAX_EXTRACTION_ATTEMPTS: i32 = 3;

/// Extraction job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `next_attempt_at`.
    Pending,
    /// Claimed by a worker.
    Processing,
    Completed,
    /// Attempt budget exhausted or non-retryable failure.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-field confidence reported by the vision service (each 0-100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfidence {
    pub bet_amount: f64,
    pub team_bet_on: f64,
    pub odds: f64,
}

/// Extraction context stored on the sign-up (JSONB) for reviewers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDetails {
    pub field_confidence: FieldConfidence,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Last error message when extraction failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub raw_response: JsonValue,
}

impl ExtractionDetails {
    pub fn to_json(&self) -> Option<JsonValue> {
        serde_json::to_value(self).ok()
    }

    pub fn from_json(value: Option<&JsonValue>) -> Option<Self> {
        value.and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// A due job joined with the sign-up fields the extraction needs.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub job_id: Uuid,
    pub sign_up_id: Uuid,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// `None` only if the sign-up lost its image reference.
    pub image_ref: Option<String>,
    pub content_type: Option<String>,
    pub operator_id: Uuid,
    pub customer_email: String,
}

/// Queue statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Mean confidence over sign-ups with a completed extraction.
    pub avg_confidence: Option<f64>,
}
