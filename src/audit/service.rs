use crate::audit::model::{AuditFilter, AuditLogEntry, NewAuditEntry};
use crate::error::{require, OpsResult};
use crate::storage::repository::AuditRepository;
use crate::storage::{now_ts, with_retry, Page};
use log::info;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuditService {
    db: Arc<DatabaseConnection>,
}

impl AuditService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one entry. A blank reason is rejected before anything is written.
    pub async fn record(&self, entry: NewAuditEntry) -> OpsResult<AuditLogEntry> {
        let operator_id = require(Some(entry.operator_id.as_str()), "operator_id")?;
        let operator_role = require(Some(entry.operator_role.as_str()), "operator_role")?;
        let reason = require(Some(entry.reason.as_str()), "reason")?;
        let target_id = require(Some(entry.target_id.as_str()), "target_id")?;
        let before = entry
            .before_state
            .as_ref()
            .map(|s| s.to_json().map(|v| v.to_string()))
            .transpose()?;
        let after = entry
            .after_state
            .as_ref()
            .map(|s| s.to_json().map(|v| v.to_string()))
            .transpose()?;

        let this = self;
        let (entry, operator_id, operator_role, reason, target_id, before, after) = (
            &entry,
            &operator_id,
            &operator_role,
            &reason,
            &target_id,
            &before,
            &after,
        );
        let row = with_retry("audit.record", move || async move {
            Ok(AuditRepository::insert(
                this.db.as_ref(),
                operator_id,
                operator_role,
                entry.action.as_str(),
                entry.action.target_type(),
                target_id,
                reason,
                entry.request_id.clone(),
                entry.idempotency_key.clone(),
                before.clone(),
                after.clone(),
                now_ts(),
            )
            .await?)
        })
        .await?;
        info!(
            "✓ audit #{} {} {}:{} by {}",
            row.id, row.action_type, row.target_type, row.target_id, row.operator_id
        );
        Ok(row.into())
    }

    pub async fn list(&self, filter: &AuditFilter, page: Page) -> OpsResult<Vec<AuditLogEntry>> {
        Ok(AuditRepository::list(self.db.as_ref(), filter, page)
            .await?
            .into_iter()
            .map(AuditLogEntry::from)
            .collect())
    }

    pub async fn count(&self, filter: &AuditFilter) -> OpsResult<u64> {
        Ok(AuditRepository::count(self.db.as_ref(), filter).await?)
    }
}
