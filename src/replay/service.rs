use crate::alert::{derived, AlertService};
use crate::error::{require, OpsError, OpsResult};
use crate::execution::{
    Execution, ExecutionService, ReplayScope, RunType, StartExecution, TargetWindow,
};
use chrono::NaiveDate;
use log::{error, info};

/// Who replays what, and why. The window comes from the scope-specific call.
#[derive(Debug, Clone, Default)]
pub struct ReplayRequest {
    pub job_id: String,
    pub operator_id: String,
    pub replay_reason: String,
    /// Defaults to the job's most recent FAILED or STOPPED execution.
    pub parent_execution_id: Option<String>,
    pub execution_id: Option<String>,
    pub operator_note: Option<String>,
}

impl ReplayRequest {
    pub fn new(job_id: &str, operator_id: &str, replay_reason: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operator_id: operator_id.to_string(),
            replay_reason: replay_reason.to_string(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_execution_id: &str) -> Self {
        self.parent_execution_id = Some(parent_execution_id.to_string());
        self
    }
}

/// Every replay is a new REPLAY execution linked to its parent; the parent
/// itself is never touched.
#[derive(Clone)]
pub struct ReplayService {
    executions: ExecutionService,
    alerts: AlertService,
}

impl ReplayService {
    pub fn new(executions: ExecutionService, alerts: AlertService) -> Self {
        Self { executions, alerts }
    }

    /// Re-runs one day's processing window.
    pub async fn replay_full(&self, req: ReplayRequest, target_date: NaiveDate) -> OpsResult<Execution> {
        self.replay(req, ReplayScope::Full, TargetWindow::Day { date: target_date })
            .await
    }

    pub async fn replay_range(
        &self,
        req: ReplayRequest,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> OpsResult<Execution> {
        self.replay(
            req,
            ReplayScope::Range,
            TargetWindow::Range {
                start: start_date,
                end: end_date,
            },
        )
        .await
    }

    pub async fn replay_single(
        &self,
        req: ReplayRequest,
        target_type: &str,
        target_id: &str,
    ) -> OpsResult<Execution> {
        let target_type = require(Some(target_type), "target_type")?;
        let target_id = require(Some(target_id), "target_id")?;
        self.replay(
            req,
            ReplayScope::Single,
            TargetWindow::Single {
                target_type,
                target_id,
            },
        )
        .await
    }

    pub async fn replays_of(&self, parent_execution_id: &str) -> OpsResult<Vec<Execution>> {
        self.executions.replays_of(parent_execution_id).await
    }

    async fn replay(
        &self,
        req: ReplayRequest,
        scope: ReplayScope,
        target: TargetWindow,
    ) -> OpsResult<Execution> {
        target.validate()?;
        let operator_id = require(Some(req.operator_id.as_str()), "operator_id")?;
        let replay_reason = require(Some(req.replay_reason.as_str()), "replay_reason")?;

        let parent_execution_id = match req
            .parent_execution_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            Some(p) => p.to_string(),
            None => self
                .executions
                .latest_unsuccessful(&req.job_id)
                .await?
                .map(|e| e.execution_id)
                .ok_or(OpsError::MissingRequiredField("parent_execution_id"))?,
        };

        let start = StartExecution {
            job_id: req.job_id.clone(),
            run_type: Some(RunType::Replay),
            target,
            operator_id: Some(operator_id),
            operator_note: req.operator_note.clone(),
            execution_id: req.execution_id.clone(),
            parent_execution_id: Some(parent_execution_id),
            replay_reason: Some(replay_reason),
            replay_scope: Some(scope),
            ..Default::default()
        };
        let replay = self.executions.start(start).await?;
        info!(
            "✓ replay {} ({}) of {} started for {}",
            replay.execution_id,
            scope.as_str(),
            replay.parent_execution_id.as_deref().unwrap_or("-"),
            replay.job_id
        );

        if let Err(e) = self.alerts.send_alert(derived::replay_executed(&replay)).await {
            error!(
                "✗ replay {} succeeded but its alert was not recorded: {}",
                replay.execution_id, e
            );
        }
        Ok(replay)
    }
}
