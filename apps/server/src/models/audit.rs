//! Audit log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::audit_log_entry;

/// State transitions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SignUpSubmitted,
    ExtractionJobCreated,
    ExtractionSucceeded,
    ExtractionRetryScheduled,
    ExtractionFailed,
    ReviewConfirmed,
    ReviewSkipped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignUpSubmitted => "sign_up_submitted",
            Self::ExtractionJobCreated => "extraction_job_created",
            Self::ExtractionSucceeded => "extraction_succeeded",
            Self::ExtractionRetryScheduled => "extraction_retry_scheduled",
            Self::ExtractionFailed => "extraction_failed",
            Self::ReviewConfirmed => "review_confirmed",
            Self::ReviewSkipped => "review_skipped",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit entry as returned by `GET /signups/{id}/audit`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sign_up_id: Uuid,
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl From<audit_log_entry::Model> for AuditLogEntry {
    fn from(model: audit_log_entry::Model) -> Self {
        Self {
            id: model.id,
            sign_up_id: model.sign_up_id,
            action: model.action,
            actor_id: model.actor_id,
            details: model.details,
            created_at: model.created_at,
        }
    }
}
