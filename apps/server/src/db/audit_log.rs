//! Database queries for the append-only audit log.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::audit_log_entry::{self as audit, ActiveModel, Entity as AuditLog};
use crate::error::{AppError, AppResult};
use crate::models::AuditAction;

use super::DbPool;

/// An audit entry to append.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub sign_up_id: Uuid,
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    pub details: Option<JsonValue>,
}

impl NewAuditEntry {
    pub fn new(sign_up_id: Uuid, action: AuditAction) -> Self {
        Self {
            sign_up_id,
            action,
            actor_id: None,
            details: None,
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// Append an entry on any connection, so callers can include it in their transaction.
pub(crate) async fn append<C: ConnectionTrait>(
    conn: &C,
    entry: NewAuditEntry,
    now: DateTime<Utc>,
) -> AppResult<audit::Model> {
    let model = ActiveModel {
        id: Set(Uuid::now_v7()),
        sign_up_id: Set(entry.sign_up_id),
        action: Set(entry.action.as_str().to_string()),
        actor_id: Set(entry.actor_id),
        details: Set(entry.details),
        created_at: Set(now),
    };

    model
        .insert(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to append audit entry: {}", e)))
}

impl DbPool {
    /// Audit trail for a sign-up, oldest first.
    pub async fn list_audit_entries(&self, sign_up_id: Uuid) -> AppResult<Vec<audit::Model>> {
        let entries = AuditLog::find()
            .filter(audit::Column::SignUpId.eq(sign_up_id))
            .order_by_asc(audit::Column::CreatedAt)
            .order_by_asc(audit::Column::Id) // UUIDv7 is time-ordered
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list audit entries: {}", e)))?;

        Ok(entries)
    }
}
