use crate::error::{require, Entity, OpsError, OpsResult};
use crate::execution::model::{
    Execution, ExecutionFilter, ExecutionLogEntry, ExecutionStats, ExecutionStatus, LogLevel,
    NewLogEntry, ReplayScope, RunType, StartExecution, TargetWindow, DATE_FORMAT,
};
use crate::execution::transitions::{check_transition, LifecycleAction};
use crate::registry::JobRegistry;
use crate::storage::entity::execution;
use crate::storage::repository::ExecutionRepository;
use crate::storage::{now_ts, with_retry, Page};
use log::{info, warn};
use sea_orm::{ConnectionTrait, DatabaseConnection, Set, TransactionTrait};
use serde_json::Value;
use std::sync::Arc;

pub const LIFECYCLE_CATEGORY: &str = "LIFECYCLE";
pub const MANUAL_STOP_CODE: &str = "MANUAL_STOP";

/// Owns the execution state machine. Every mutation reads and writes inside
/// one transaction and only lands if the row is still RUNNING.
#[derive(Clone)]
pub struct ExecutionService {
    db: Arc<DatabaseConnection>,
}

impl ExecutionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn start(&self, req: StartExecution) -> OpsResult<Execution> {
        let this = self;
        let req = &req;
        with_retry("execution.start", move || async move { this.start_once(req).await }).await
    }

    async fn start_once(&self, req: &StartExecution) -> OpsResult<Execution> {
        let run_type = req.run_type();
        let operator_id = if run_type.requires_operator() {
            Some(require(req.operator_id.as_deref(), "operator_id")?)
        } else {
            trimmed(req.operator_id.as_deref())
        };
        let (replay_reason, parent_execution_id, replay_scope) = if run_type == RunType::Replay {
            (
                Some(require(req.replay_reason.as_deref(), "replay_reason")?),
                Some(require(
                    req.parent_execution_id.as_deref(),
                    "parent_execution_id",
                )?),
                Some(req.replay_scope.unwrap_or_else(|| scope_for(&req.target))),
            )
        } else {
            (
                trimmed(req.replay_reason.as_deref()),
                trimmed(req.parent_execution_id.as_deref()),
                None,
            )
        };
        req.target.validate()?;

        let execution_id = trimmed(req.execution_id.as_deref())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let txn = self.db.begin().await?;
        JobRegistry::get_active(&txn, &req.job_id).await?;
        if let Some(parent) = &parent_execution_id {
            if ExecutionRepository::find(&txn, parent).await?.is_none() {
                return Err(OpsError::not_found(Entity::Execution, parent));
            }
        }

        let now = now_ts();
        let target = TargetColumns::from(&req.target);
        let model = execution::ActiveModel {
            execution_id: Set(execution_id.clone()),
            job_id: Set(req.job_id.clone()),
            run_type: Set(run_type.as_str().to_string()),
            status: Set(ExecutionStatus::Running.as_str().to_string()),
            scheduled_at: Set(req.scheduled_at),
            started_at: Set(Some(now)),
            ended_at: Set(None),
            target_date: Set(target.date),
            target_start_date: Set(target.start_date),
            target_end_date: Set(target.end_date),
            target_type: Set(target.target_type),
            target_id: Set(target.target_id),
            processed_count: Set(0),
            success_count: Set(0),
            failed_count: Set(0),
            error_code: Set(None),
            error_message: Set(None),
            error_detail: Set(None),
            operator_id: Set(operator_id),
            operator_note: Set(trimmed(req.operator_note.as_deref())),
            parent_execution_id: Set(parent_execution_id),
            replay_reason: Set(replay_reason),
            replay_scope: Set(replay_scope.map(|s| s.as_str().to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        };
        if !ExecutionRepository::insert_if_absent(&txn, model).await? {
            warn!("⚠ duplicate start rejected for execution {}", execution_id);
            return Err(OpsError::DuplicateExecution(execution_id));
        }

        let entry = NewLogEntry::new(
            LogLevel::Info,
            LIFECYCLE_CATEGORY,
            format!(
                "{} execution of {} started ({})",
                run_type.as_str(),
                req.job_id,
                req.target.describe()
            ),
        )
        .with_code("EXECUTION_STARTED");
        ExecutionRepository::append_log(&txn, &execution_id, &entry, now).await?;

        let created = reload(&txn, &execution_id).await?;
        txn.commit().await?;
        info!(
            "✓ execution {} started: job={} run_type={}",
            execution_id,
            req.job_id,
            run_type.as_str()
        );
        Execution::try_from(created)
    }

    /// Absolute counters; legal only while RUNNING.
    pub async fn update_progress(
        &self,
        execution_id: &str,
        processed: i64,
        success: i64,
        failed: i64,
    ) -> OpsResult<Execution> {
        validate_counts(Some(processed), Some(success), Some(failed))?;
        let this = self;
        with_retry("execution.update_progress", move || async move {
            let txn = this.db.begin().await?;
            load_for(&txn, execution_id, LifecycleAction::UpdateProgress).await?;
            let rows = ExecutionRepository::mark_progress(
                &txn,
                execution_id,
                processed,
                success,
                failed,
                now_ts(),
            )
            .await?;
            guard(rows, execution_id, LifecycleAction::UpdateProgress)?;
            let updated = reload(&txn, execution_id).await?;
            txn.commit().await?;
            Execution::try_from(updated)
        })
        .await
    }

    pub async fn complete(
        &self,
        execution_id: &str,
        processed: Option<i64>,
        success: Option<i64>,
    ) -> OpsResult<Execution> {
        validate_counts(processed, success, None)?;
        let this = self;
        let completed = with_retry("execution.complete", move || async move {
            let txn = this.db.begin().await?;
            let current = load_for(&txn, execution_id, LifecycleAction::Complete).await?;
            validate_counts(
                Some(processed.unwrap_or(current.processed_count)),
                Some(success.unwrap_or(current.success_count)),
                Some(current.failed_count),
            )?;
            let now = now_ts();
            let rows =
                ExecutionRepository::mark_success(&txn, execution_id, processed, success, now)
                    .await?;
            guard(rows, execution_id, LifecycleAction::Complete)?;
            let entry = NewLogEntry::new(LogLevel::Info, LIFECYCLE_CATEGORY, "execution completed")
                .with_code("EXECUTION_COMPLETED");
            ExecutionRepository::append_log(&txn, execution_id, &entry, now).await?;
            let updated = reload(&txn, execution_id).await?;
            txn.commit().await?;
            Execution::try_from(updated)
        })
        .await?;
        info!(
            "✓ execution {} completed: processed={} success={} failed={}",
            execution_id, completed.processed_count, completed.success_count, completed.failed_count
        );
        Ok(completed)
    }

    pub async fn fail(
        &self,
        execution_id: &str,
        error_code: &str,
        error_message: &str,
        error_detail: Option<Value>,
    ) -> OpsResult<Execution> {
        let error_code = require(Some(error_code), "error_code")?;
        let error_message = error_message.trim().to_string();
        let this = self;
        let (code, message, detail) = (&error_code, &error_message, &error_detail);
        let failed = with_retry("execution.fail", move || async move {
            let txn = this.db.begin().await?;
            load_for(&txn, execution_id, LifecycleAction::Fail).await?;
            let now = now_ts();
            let rows = ExecutionRepository::mark_failed(
                &txn,
                execution_id,
                code,
                message,
                detail.as_ref().map(|d| d.to_string()),
                now,
            )
            .await?;
            guard(rows, execution_id, LifecycleAction::Fail)?;
            let entry = NewLogEntry::new(LogLevel::Error, LIFECYCLE_CATEGORY, message.clone())
                .with_code(code.clone())
                .with_detail(detail.clone());
            ExecutionRepository::append_log(&txn, execution_id, &entry, now).await?;
            let updated = reload(&txn, execution_id).await?;
            txn.commit().await?;
            Execution::try_from(updated)
        })
        .await?;
        warn!(
            "✗ execution {} failed: [{}] {}",
            execution_id, error_code, error_message
        );
        Ok(failed)
    }

    /// Operator stop. The operator and reason end up in `error_message`.
    pub async fn stop(
        &self,
        execution_id: &str,
        operator_id: &str,
        reason: &str,
    ) -> OpsResult<Execution> {
        let operator_id = require(Some(operator_id), "operator_id")?;
        let reason = require(Some(reason), "reason")?;
        let message = format!("stopped by {}: {}", operator_id, reason);
        let this = self;
        let msg = &message;
        let stopped = with_retry("execution.stop", move || async move {
            let txn = this.db.begin().await?;
            load_for(&txn, execution_id, LifecycleAction::Stop).await?;
            let now = now_ts();
            let rows =
                ExecutionRepository::mark_stopped(&txn, execution_id, MANUAL_STOP_CODE, msg, now)
                    .await?;
            guard(rows, execution_id, LifecycleAction::Stop)?;
            let entry = NewLogEntry::new(LogLevel::Warn, LIFECYCLE_CATEGORY, msg.clone())
                .with_code(MANUAL_STOP_CODE);
            ExecutionRepository::append_log(&txn, execution_id, &entry, now).await?;
            let updated = reload(&txn, execution_id).await?;
            txn.commit().await?;
            Execution::try_from(updated)
        })
        .await?;
        warn!("⚠ execution {} {}", execution_id, message);
        Ok(stopped)
    }

    pub async fn get(&self, execution_id: &str) -> OpsResult<Execution> {
        reload(self.db.as_ref(), execution_id).await?.try_into()
    }

    pub async fn list(&self, filter: &ExecutionFilter, page: Page) -> OpsResult<Vec<Execution>> {
        ExecutionRepository::list(self.db.as_ref(), filter, page)
            .await?
            .into_iter()
            .map(Execution::try_from)
            .collect()
    }

    pub async fn count(&self, filter: &ExecutionFilter) -> OpsResult<u64> {
        Ok(ExecutionRepository::count(self.db.as_ref(), filter).await?)
    }

    /// Diagnostic lines are accepted in any state, terminal included.
    pub async fn append_log(
        &self,
        execution_id: &str,
        entry: NewLogEntry,
    ) -> OpsResult<ExecutionLogEntry> {
        let this = self;
        let entry = &entry;
        with_retry("execution.append_log", move || async move {
            let txn = this.db.begin().await?;
            reload(&txn, execution_id).await?;
            let row = ExecutionRepository::append_log(&txn, execution_id, entry, now_ts()).await?;
            txn.commit().await?;
            ExecutionLogEntry::try_from(row)
        })
        .await
    }

    pub async fn logs(&self, execution_id: &str) -> OpsResult<Vec<ExecutionLogEntry>> {
        reload(self.db.as_ref(), execution_id).await?;
        ExecutionRepository::logs(self.db.as_ref(), execution_id)
            .await?
            .into_iter()
            .map(ExecutionLogEntry::try_from)
            .collect()
    }

    /// Replay children of `parent_execution_id`, newest first.
    pub async fn replays_of(&self, parent_execution_id: &str) -> OpsResult<Vec<Execution>> {
        let filter = ExecutionFilter {
            parent_execution_id: Some(parent_execution_id.to_string()),
            run_type: Some(RunType::Replay),
            ..Default::default()
        };
        self.list(&filter, Page::new(Some(crate::storage::MAX_PAGE_SIZE), None))
            .await
    }

    /// Default replay parent: the job's most recent FAILED or STOPPED run.
    pub async fn latest_unsuccessful(&self, job_id: &str) -> OpsResult<Option<Execution>> {
        ExecutionRepository::latest_unsuccessful(self.db.as_ref(), job_id)
            .await?
            .map(Execution::try_from)
            .transpose()
    }

    pub async fn stats(&self) -> OpsResult<ExecutionStats> {
        let mut stats = ExecutionStats::default();
        for (status, n) in ExecutionRepository::count_by_status(self.db.as_ref()).await? {
            let n = n.max(0) as u64;
            stats.total += n;
            match status.parse::<ExecutionStatus>()? {
                ExecutionStatus::Running => stats.running += n,
                ExecutionStatus::Success => stats.success += n,
                ExecutionStatus::Failed => stats.failed += n,
                ExecutionStatus::Stopped => stats.stopped += n,
            }
        }
        Ok(stats)
    }
}

/// Loads the row and checks the transition table before any write.
async fn load_for<C: ConnectionTrait>(
    conn: &C,
    execution_id: &str,
    action: LifecycleAction,
) -> OpsResult<execution::Model> {
    let model = reload(conn, execution_id).await?;
    check_transition(execution_id, model.status.parse()?, action)?;
    Ok(model)
}

async fn reload<C: ConnectionTrait>(conn: &C, execution_id: &str) -> OpsResult<execution::Model> {
    ExecutionRepository::find(conn, execution_id)
        .await?
        .ok_or_else(|| OpsError::not_found(Entity::Execution, execution_id))
}

/// The conditional update matched nothing: someone else moved the row first.
fn guard(rows: u64, execution_id: &str, action: LifecycleAction) -> OpsResult<()> {
    if rows == 1 {
        Ok(())
    } else {
        Err(OpsError::InvalidTransition(format!(
            "cannot {} execution {}: status changed concurrently",
            action.as_str(),
            execution_id
        )))
    }
}

fn validate_counts(
    processed: Option<i64>,
    success: Option<i64>,
    failed: Option<i64>,
) -> OpsResult<()> {
    for (name, value) in [("processed", processed), ("success", success), ("failed", failed)] {
        if let Some(v) = value {
            if v < 0 {
                return Err(OpsError::InvalidTransition(format!(
                    "{} count must be non-negative, got {}",
                    name, v
                )));
            }
        }
    }
    if let (Some(p), Some(s), Some(f)) = (processed, success, failed) {
        if s + f > p {
            return Err(OpsError::InvalidTransition(format!(
                "success ({}) + failed ({}) exceeds processed ({})",
                s, f, p
            )));
        }
    }
    Ok(())
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn scope_for(target: &TargetWindow) -> ReplayScope {
    match target {
        TargetWindow::Range { .. } => ReplayScope::Range,
        TargetWindow::Single { .. } => ReplayScope::Single,
        TargetWindow::Day { .. } | TargetWindow::Unspecified => ReplayScope::Full,
    }
}

#[derive(Default)]
struct TargetColumns {
    date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    target_type: Option<String>,
    target_id: Option<String>,
}

impl From<&TargetWindow> for TargetColumns {
    fn from(target: &TargetWindow) -> Self {
        match target {
            TargetWindow::Unspecified => Self::default(),
            TargetWindow::Day { date } => Self {
                date: Some(date.format(DATE_FORMAT).to_string()),
                ..Default::default()
            },
            TargetWindow::Range { start, end } => Self {
                start_date: Some(start.format(DATE_FORMAT).to_string()),
                end_date: Some(end.format(DATE_FORMAT).to_string()),
                ..Default::default()
            },
            TargetWindow::Single {
                target_type,
                target_id,
            } => Self {
                target_type: Some(target_type.trim().to_string()),
                target_id: Some(target_id.trim().to_string()),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_must_be_consistent() {
        assert!(validate_counts(Some(10), Some(7), Some(3)).is_ok());
        assert!(validate_counts(Some(10), Some(8), Some(3)).is_err());
        assert!(validate_counts(Some(-1), None, None).is_err());
        assert!(validate_counts(None, Some(5), None).is_ok());
    }

    #[test]
    fn replay_scope_follows_the_window() {
        let single = TargetWindow::Single {
            target_type: "SECURITY".into(),
            target_id: "AAPL".into(),
        };
        assert_eq!(scope_for(&single), ReplayScope::Single);
        assert_eq!(scope_for(&TargetWindow::Unspecified), ReplayScope::Full);
    }
}
