use crate::error::{require, Entity, OpsError, OpsResult};
use crate::storage::entity::approval;
use crate::storage::repository::ApprovalRepository;
use crate::storage::{now_ts, with_retry, Page};
use async_trait::async_trait;
use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub const RESULT_VERSION_ACTIVATE: &str = "RESULT_VERSION_ACTIVATE";

pub const PENDING: &str = "PENDING";
pub const APPROVED: &str = "APPROVED";
pub const REJECTED: &str = "REJECTED";
pub const EXECUTED: &str = "EXECUTED";

/// The approval workflow as seen by privileged operations.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn fetch(&self, approval_id: i32) -> OpsResult<Option<approval::Model>>;
    /// Consumes an APPROVED approval so it cannot authorise a second action.
    /// Exactly one caller wins; the others get APPROVAL_INVALID.
    async fn mark_executed(&self, approval_id: i32) -> OpsResult<()>;
    /// Hands a consumed approval back after the action it authorised failed.
    async fn restore(&self, approval_id: i32) -> OpsResult<()>;
}

/// Checks that `approval_id` authorises `request_type` on `target_id`.
pub async fn ensure_approved(
    gate: &dyn ApprovalGate,
    approval_id: i32,
    request_type: &str,
    target_id: &str,
) -> OpsResult<approval::Model> {
    let record = gate
        .fetch(approval_id)
        .await?
        .ok_or_else(|| OpsError::ApprovalInvalid(format!("approval {} not found", approval_id)))?;
    if record.status != APPROVED {
        return Err(OpsError::ApprovalInvalid(format!(
            "approval {} is not approved (status {})",
            approval_id, record.status
        )));
    }
    if record.request_type != request_type {
        return Err(OpsError::ApprovalInvalid(format!(
            "approval {} is for {}, not {}",
            approval_id, record.request_type, request_type
        )));
    }
    if let Some(approved_target) = record.target_id.as_deref() {
        if approved_target != target_id {
            return Err(OpsError::ApprovalInvalid(format!(
                "approval {} covers target {}, not {}",
                approval_id, approved_target, target_id
            )));
        }
    }
    Ok(record)
}

/// sea-orm backed approvals table.
#[derive(Clone)]
pub struct ApprovalStore {
    db: Arc<DatabaseConnection>,
}

impl ApprovalStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn request(
        &self,
        request_type: &str,
        target_type: Option<&str>,
        target_id: Option<&str>,
        requested_by: &str,
        reason: &str,
    ) -> OpsResult<approval::Model> {
        let request_type = require(Some(request_type), "request_type")?.to_ascii_uppercase();
        let requested_by = require(Some(requested_by), "operator_id")?;
        let reason = require(Some(reason), "reason")?;
        let target_type = target_type.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let target_id = target_id.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let this = self;
        let (rt, tt, tid, by, why) = (&request_type, &target_type, &target_id, &requested_by, &reason);
        let created = with_retry("approval.request", move || async move {
            Ok(ApprovalRepository::insert(
                this.db.as_ref(),
                rt,
                tt.clone(),
                tid.clone(),
                by,
                why,
                now_ts(),
            )
            .await?)
        })
        .await?;
        info!(
            "✓ approval #{} requested: {} by {}",
            created.id, created.request_type, created.requested_by
        );
        Ok(created)
    }

    /// PENDING -> APPROVED or REJECTED. Returns the record before and after.
    pub async fn decide(
        &self,
        approval_id: i32,
        approve: bool,
        decided_by: &str,
    ) -> OpsResult<(approval::Model, approval::Model)> {
        let decided_by = require(Some(decided_by), "operator_id")?;
        let before = self.get(approval_id).await?;
        let to = if approve { APPROVED } else { REJECTED };
        let rows = ApprovalRepository::transition(
            self.db.as_ref(),
            approval_id,
            PENDING,
            to,
            Some(decided_by.as_str()),
            now_ts(),
        )
        .await?;
        if rows != 1 {
            return Err(OpsError::ApprovalInvalid(format!(
                "approval {} is not pending (status {})",
                approval_id, before.status
            )));
        }
        let after = self.get(approval_id).await?;
        info!("✓ approval #{} {} by {}", approval_id, to, decided_by);
        Ok((before, after))
    }

    pub async fn get(&self, approval_id: i32) -> OpsResult<approval::Model> {
        ApprovalRepository::find(self.db.as_ref(), approval_id)
            .await?
            .ok_or_else(|| OpsError::not_found(Entity::Approval, approval_id))
    }

    pub async fn list(&self, status: Option<&str>, page: Page) -> OpsResult<Vec<approval::Model>> {
        Ok(ApprovalRepository::list(self.db.as_ref(), status, page).await?)
    }
}

#[async_trait]
impl ApprovalGate for ApprovalStore {
    async fn fetch(&self, approval_id: i32) -> OpsResult<Option<approval::Model>> {
        Ok(ApprovalRepository::find(self.db.as_ref(), approval_id).await?)
    }

    async fn mark_executed(&self, approval_id: i32) -> OpsResult<()> {
        let rows = ApprovalRepository::transition(
            self.db.as_ref(),
            approval_id,
            APPROVED,
            EXECUTED,
            None,
            now_ts(),
        )
        .await?;
        if rows != 1 {
            warn!("⚠ approval #{} was consumed concurrently", approval_id);
            return Err(OpsError::ApprovalInvalid(format!(
                "approval {} is no longer approved",
                approval_id
            )));
        }
        info!("✓ approval #{} consumed", approval_id);
        Ok(())
    }

    async fn restore(&self, approval_id: i32) -> OpsResult<()> {
        let rows = ApprovalRepository::transition(
            self.db.as_ref(),
            approval_id,
            EXECUTED,
            APPROVED,
            None,
            now_ts(),
        )
        .await?;
        if rows != 1 {
            return Err(OpsError::InvariantViolation(format!(
                "approval {} was not executed",
                approval_id
            )));
        }
        info!("approval #{} handed back", approval_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedGate(HashMap<i32, approval::Model>);

    #[async_trait]
    impl ApprovalGate for FixedGate {
        async fn fetch(&self, approval_id: i32) -> OpsResult<Option<approval::Model>> {
            Ok(self.0.get(&approval_id).cloned())
        }

        async fn mark_executed(&self, _approval_id: i32) -> OpsResult<()> {
            Ok(())
        }

        async fn restore(&self, _approval_id: i32) -> OpsResult<()> {
            Ok(())
        }
    }

    fn record(id: i32, request_type: &str, status: &str, target_id: Option<&str>) -> approval::Model {
        approval::Model {
            id,
            request_type: request_type.to_string(),
            status: status.to_string(),
            target_type: target_id.map(|_| "RESULT_VERSION".to_string()),
            target_id: target_id.map(str::to_string),
            requested_by: "ops1".to_string(),
            reason: "bad rerun".to_string(),
            decided_by: None,
            decided_at: None,
            created_at: 0,
        }
    }

    fn gate() -> FixedGate {
        FixedGate(HashMap::from([
            (1, record(1, RESULT_VERSION_ACTIVATE, APPROVED, None)),
            (2, record(2, RESULT_VERSION_ACTIVATE, PENDING, None)),
            (3, record(3, "EXECUTION_REPLAY", APPROVED, None)),
            (4, record(4, RESULT_VERSION_ACTIVATE, APPROVED, Some("7"))),
            (5, record(5, RESULT_VERSION_ACTIVATE, EXECUTED, None)),
        ]))
    }

    #[tokio::test]
    async fn only_matching_approved_records_pass() {
        let g = gate();
        assert!(ensure_approved(&g, 1, RESULT_VERSION_ACTIVATE, "9").await.is_ok());
        assert!(ensure_approved(&g, 4, RESULT_VERSION_ACTIVATE, "7").await.is_ok());

        for (id, target) in [(2, "9"), (3, "9"), (4, "8"), (5, "9"), (99, "9")] {
            let err = ensure_approved(&g, id, RESULT_VERSION_ACTIVATE, target)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "APPROVAL_INVALID", "approval {id}");
        }
    }
}
