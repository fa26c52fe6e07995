//! The boundary every privileged call goes through: request correlation,
//! idempotency keys, approval checks, then audit and alert side effects in a
//! fixed order after the core mutation has committed. Once the mutation has
//! committed the call reports success; later side effects only log failures.

pub mod approval;
pub mod idempotency;

pub use approval::{ensure_approved, ApprovalGate, ApprovalStore, RESULT_VERSION_ACTIVATE};
pub use idempotency::{Claim, IdempotencyStore};

use crate::alert::{derived, Alert, AlertDispatcher, AlertService, NewAlert};
use crate::audit::{AuditAction, AuditService, AuditSnapshot, NewAuditEntry};
use crate::error::{require, OpsResult};
use crate::execution::{Execution, ExecutionService, StartExecution};
use crate::replay::{ReplayRequest, ReplayService};
use crate::storage::entity;
use crate::versioning::{ReactivateVersion, VersionChange, VersionService};
use chrono::NaiveDate;
use log::{error, warn};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::sync::Arc;

pub const SYSTEM_OPERATOR: &str = "SYSTEM";

/// Caller identity and correlation ids. Authorisation has already happened
/// upstream; this only carries who and which request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub operator_id: String,
    pub operator_role: String,
    pub idempotency_key: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: &str, operator_id: &str, operator_role: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            operator_id: operator_id.to_string(),
            operator_role: operator_role.to_string(),
            idempotency_key: None,
        }
    }

    /// Scheduler-originated calls.
    pub fn system(request_id: &str) -> Self {
        Self::new(request_id, SYSTEM_OPERATOR, SYSTEM_OPERATOR)
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    /// Everything the audit entry will need, checked before any mutation.
    fn validate(&self) -> OpsResult<()> {
        require(Some(self.request_id.as_str()), "request_id")?;
        require(Some(self.operator_id.as_str()), "operator_id")?;
        require(Some(self.operator_role.as_str()), "operator_role")?;
        Ok(())
    }

    fn idempotency_key(&self) -> OpsResult<String> {
        require(self.idempotency_key.as_deref(), "idempotency_key")
    }
}

/// Window of a replay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayTarget {
    Full(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Single { target_type: String, target_id: String },
}

#[derive(Clone)]
pub struct ControlPlane {
    executions: ExecutionService,
    replays: ReplayService,
    versions: VersionService,
    audit: AuditService,
    alerts: AlertService,
    approvals: ApprovalStore,
    gate: Arc<dyn ApprovalGate>,
    idempotency: IdempotencyStore,
}

impl ControlPlane {
    pub fn new(
        db: Arc<DatabaseConnection>,
        dispatcher: Arc<AlertDispatcher>,
        idempotency_retention_secs: i64,
    ) -> Self {
        let executions = ExecutionService::new(db.clone());
        let alerts = AlertService::new(db.clone(), dispatcher);
        let approvals = ApprovalStore::new(db.clone());
        Self {
            replays: ReplayService::new(executions.clone(), alerts.clone()),
            versions: VersionService::new(db.clone()),
            audit: AuditService::new(db.clone()),
            gate: Arc::new(approvals.clone()),
            idempotency: IdempotencyStore::new(db, idempotency_retention_secs),
            executions,
            alerts,
            approvals,
        }
    }

    /// Swaps the approval source, e.g. for an external workflow service.
    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn executions(&self) -> &ExecutionService {
        &self.executions
    }

    pub fn replays(&self) -> &ReplayService {
        &self.replays
    }

    pub fn versions(&self) -> &VersionService {
        &self.versions
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    pub fn alerts(&self) -> &AlertService {
        &self.alerts
    }

    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    pub async fn start_execution(
        &self,
        ctx: &RequestContext,
        mut req: StartExecution,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        let key = ctx.idempotency_key()?;
        if req.run_type().requires_operator()
            && req.operator_id.as_deref().map_or(true, |o| o.trim().is_empty())
        {
            req.operator_id = Some(ctx.operator_id.clone());
        }
        self.idempotency
            .run(
                &key,
                AuditAction::ExecutionStart.as_str(),
                move || self.executions.start(req),
                move |exec: Execution| async move {
                    let reason = exec.operator_note.clone().unwrap_or_else(|| {
                        format!("{} start of {}", exec.run_type.as_str(), exec.job_id)
                    });
                    self.record(
                        ctx,
                        AuditAction::ExecutionStart,
                        &exec.execution_id,
                        &reason,
                        None,
                        Some(AuditSnapshot::Execution(exec.clone())),
                    )
                    .await;
                    exec
                },
            )
            .await
    }

    /// Not audited: progress is telemetry, not a privileged action.
    pub async fn update_progress(
        &self,
        ctx: &RequestContext,
        execution_id: &str,
        processed: i64,
        success: i64,
        failed: i64,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        self.executions
            .update_progress(execution_id, processed, success, failed)
            .await
    }

    pub async fn complete_execution(
        &self,
        ctx: &RequestContext,
        execution_id: &str,
        processed: Option<i64>,
        success: Option<i64>,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        let before = self.executions.get(execution_id).await?;
        let exec = self
            .executions
            .complete(execution_id, processed, success)
            .await?;
        self.record(
            ctx,
            AuditAction::ExecutionComplete,
            execution_id,
            "execution completed",
            Some(AuditSnapshot::Execution(before)),
            Some(AuditSnapshot::Execution(exec.clone())),
        )
        .await;
        if let Some(alert) = derived::completed_with_errors(&exec) {
            self.raise(alert).await;
        }
        Ok(exec)
    }

    pub async fn fail_execution(
        &self,
        ctx: &RequestContext,
        execution_id: &str,
        error_code: &str,
        error_message: &str,
        error_detail: Option<Value>,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        let before = self.executions.get(execution_id).await?;
        let exec = self
            .executions
            .fail(execution_id, error_code, error_message, error_detail)
            .await?;
        let reason = format!("[{}] {}", error_code.trim(), error_message.trim());
        self.record(
            ctx,
            AuditAction::ExecutionFail,
            execution_id,
            &reason,
            Some(AuditSnapshot::Execution(before)),
            Some(AuditSnapshot::Execution(exec.clone())),
        )
        .await;
        self.raise(derived::job_failed(&exec)).await;
        Ok(exec)
    }

    pub async fn stop_execution(
        &self,
        ctx: &RequestContext,
        execution_id: &str,
        reason: &str,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        let key = ctx.idempotency_key()?;
        let before = self.executions.get(execution_id).await?;
        self.idempotency
            .run(
                &key,
                AuditAction::ExecutionStop.as_str(),
                move || self.executions.stop(execution_id, &ctx.operator_id, reason),
                move |exec: Execution| async move {
                    self.record(
                        ctx,
                        AuditAction::ExecutionStop,
                        execution_id,
                        reason,
                        Some(AuditSnapshot::Execution(before)),
                        Some(AuditSnapshot::Execution(exec.clone())),
                    )
                    .await;
                    self.raise(derived::job_stopped(&exec)).await;
                    exec
                },
            )
            .await
    }

    pub async fn replay(
        &self,
        ctx: &RequestContext,
        mut req: ReplayRequest,
        target: ReplayTarget,
    ) -> OpsResult<Execution> {
        ctx.validate()?;
        let key = ctx.idempotency_key()?;
        if req.operator_id.trim().is_empty() {
            req.operator_id = ctx.operator_id.clone();
        }
        let reason = req.replay_reason.clone();
        self.idempotency
            .run(
                &key,
                AuditAction::ExecutionReplay.as_str(),
                move || async move {
                    match target {
                        ReplayTarget::Full(date) => self.replays.replay_full(req, date).await,
                        ReplayTarget::Range(start, end) => {
                            self.replays.replay_range(req, start, end).await
                        }
                        ReplayTarget::Single {
                            target_type,
                            target_id,
                        } => {
                            self.replays
                                .replay_single(req, &target_type, &target_id)
                                .await
                        }
                    }
                },
                move |replay: Execution| async move {
                    let parent = match replay.parent_execution_id.as_deref() {
                        Some(p) => match self.executions.get(p).await {
                            Ok(exec) => Some(AuditSnapshot::Execution(exec)),
                            Err(e) => {
                                warn!("⚠ parent {} snapshot unavailable for audit: {}", p, e);
                                None
                            }
                        },
                        None => None,
                    };
                    self.record(
                        ctx,
                        AuditAction::ExecutionReplay,
                        &replay.execution_id,
                        &reason,
                        parent,
                        Some(AuditSnapshot::Execution(replay.clone())),
                    )
                    .await;
                    replay
                },
            )
            .await
    }

    pub async fn replay_full(
        &self,
        ctx: &RequestContext,
        req: ReplayRequest,
        target_date: NaiveDate,
    ) -> OpsResult<Execution> {
        self.replay(ctx, req, ReplayTarget::Full(target_date)).await
    }

    pub async fn replay_range(
        &self,
        ctx: &RequestContext,
        req: ReplayRequest,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> OpsResult<Execution> {
        self.replay(ctx, req, ReplayTarget::Range(start_date, end_date))
            .await
    }

    pub async fn replay_single(
        &self,
        ctx: &RequestContext,
        req: ReplayRequest,
        target_type: &str,
        target_id: &str,
    ) -> OpsResult<Execution> {
        let target = ReplayTarget::Single {
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
        };
        self.replay(ctx, req, target).await
    }

    pub async fn create_version(
        &self,
        ctx: &RequestContext,
        result_type: &str,
        result_id: &str,
        execution_id: Option<&str>,
    ) -> OpsResult<VersionChange> {
        ctx.validate()?;
        let change = self
            .versions
            .create_version(result_type, result_id, execution_id)
            .await?;
        let reason = format!(
            "version {} created{}",
            change.activated.version_no,
            execution_id
                .map(|e| format!(" from execution {}", e))
                .unwrap_or_default()
        );
        self.record(
            ctx,
            AuditAction::ResultVersionCreate,
            &change.activated.id.to_string(),
            &reason,
            change.deactivated.clone().map(AuditSnapshot::ResultVersion),
            Some(AuditSnapshot::ResultVersion(change.activated.clone())),
        )
        .await;
        Ok(change)
    }

    /// Requires an APPROVED `RESULT_VERSION_ACTIVATE` approval, consumed
    /// before the swap and handed back if the swap fails.
    ///
    /// Without `expected_active_version_id` the version active when the
    /// request is accepted is expected, so of two racing calls on one key
    /// only the first to commit wins.
    pub async fn reactivate_version(
        &self,
        ctx: &RequestContext,
        approval_id: i32,
        version_id: i32,
        reason: &str,
        expected_active_version_id: Option<i32>,
    ) -> OpsResult<VersionChange> {
        ctx.validate()?;
        ensure_approved(
            self.gate.as_ref(),
            approval_id,
            RESULT_VERSION_ACTIVATE,
            &version_id.to_string(),
        )
        .await?;
        require(Some(reason), "reason")?;
        let target = self.versions.get_version(version_id).await?;
        let expected = match expected_active_version_id {
            Some(id) => Some(id),
            None => self
                .versions
                .get_active_version(&target.result_type, &target.result_id)
                .await?
                .map(|v| v.id),
        };
        self.gate.mark_executed(approval_id).await?;

        let req = ReactivateVersion::new(version_id, &ctx.operator_id, reason, expected);
        let change = match self.versions.reactivate_version(req).await {
            Ok(change) => change,
            Err(err) => {
                if let Err(e) = self.gate.restore(approval_id).await {
                    error!("✗ approval #{} could not be handed back: {}", approval_id, e);
                }
                return Err(err);
            }
        };

        self.record(
            ctx,
            AuditAction::ResultVersionActivate,
            &version_id.to_string(),
            reason,
            change.deactivated.clone().map(AuditSnapshot::ResultVersion),
            Some(AuditSnapshot::ResultVersion(change.activated.clone())),
        )
        .await;
        self.raise(derived::version_reactivated(
            &change,
            &ctx.operator_id,
            reason.trim(),
        ))
        .await;
        Ok(change)
    }

    pub async fn acknowledge_alert(&self, ctx: &RequestContext, alert_id: i32) -> OpsResult<Alert> {
        ctx.validate()?;
        let before = self.alerts.get(alert_id).await?;
        let alert = self
            .alerts
            .acknowledge_alert(alert_id, &ctx.operator_id)
            .await?;
        self.record(
            ctx,
            AuditAction::AlertAcknowledge,
            &alert_id.to_string(),
            "alert acknowledged",
            Some(AuditSnapshot::Alert(before)),
            Some(AuditSnapshot::Alert(alert.clone())),
        )
        .await;
        Ok(alert)
    }

    pub async fn request_approval(
        &self,
        ctx: &RequestContext,
        request_type: &str,
        target_type: Option<&str>,
        target_id: Option<&str>,
        reason: &str,
    ) -> OpsResult<entity::approval::Model> {
        ctx.validate()?;
        self.approvals
            .request(request_type, target_type, target_id, &ctx.operator_id, reason)
            .await
    }

    pub async fn decide_approval(
        &self,
        ctx: &RequestContext,
        approval_id: i32,
        approve: bool,
        reason: &str,
    ) -> OpsResult<entity::approval::Model> {
        ctx.validate()?;
        require(Some(reason), "reason")?;
        let (before, after) = self
            .approvals
            .decide(approval_id, approve, &ctx.operator_id)
            .await?;
        self.record(
            ctx,
            AuditAction::ApprovalDecide,
            &approval_id.to_string(),
            reason,
            Some(AuditSnapshot::Approval(before)),
            Some(AuditSnapshot::Approval(after.clone())),
        )
        .await;
        Ok(after)
    }

    /// Runs once the mutation has committed. A failure cannot undo the change,
    /// so the caller still gets the committed result and the entry goes to
    /// the error log in full.
    async fn record(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        target_id: &str,
        reason: &str,
        before: Option<AuditSnapshot>,
        after: Option<AuditSnapshot>,
    ) {
        let entry = NewAuditEntry {
            operator_id: ctx.operator_id.clone(),
            operator_role: ctx.operator_role.clone(),
            action,
            target_id: target_id.to_string(),
            reason: reason.to_string(),
            request_id: Some(ctx.request_id.clone()),
            idempotency_key: ctx.idempotency_key.clone(),
            before_state: before,
            after_state: after,
        };
        if let Err(e) = self.audit.record(entry.clone()).await {
            error!(
                "✗ audit entry for committed {} on {} not stored: {}; entry: {:?}",
                action.as_str(),
                target_id,
                e,
                entry
            );
        }
    }

    /// Alerts never fail the operation that raised them.
    async fn raise(&self, alert: NewAlert) {
        if let Err(e) = self.alerts.send_alert(alert).await {
            error!("✗ alert could not be recorded: {}", e);
        }
    }
}
