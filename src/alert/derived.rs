//! Alerts raised by lifecycle, replay and version events.

use crate::alert::model::{
    AlertLevel, NewAlert, JOB_COMPLETED_WITH_ERRORS, JOB_FAILED, JOB_STOPPED, REPLAY_EXECUTED,
    RESULT_VERSION_REACTIVATED,
};
use crate::execution::Execution;
use crate::versioning::VersionChange;
use serde_json::json;

pub fn job_failed(exec: &Execution) -> NewAlert {
    let code = exec.error_code.clone().unwrap_or_default();
    NewAlert::new(
        JOB_FAILED,
        AlertLevel::Error,
        format!("{} failed ({})", exec.job_id, code),
        exec.error_message
            .clone()
            .unwrap_or_else(|| "execution failed".to_string()),
    )
    .for_execution(&exec.execution_id)
    .with_error_code(exec.error_code.clone())
    .with_detail(json!({
        "job_id": exec.job_id,
        "run_type": exec.run_type,
        "target": exec.target.describe(),
        "processed": exec.processed_count,
        "failed": exec.failed_count,
        "error_detail": exec.error_detail,
    }))
}

pub fn job_stopped(exec: &Execution) -> NewAlert {
    NewAlert::new(
        JOB_STOPPED,
        AlertLevel::Warn,
        format!("{} stopped", exec.job_id),
        exec.error_message
            .clone()
            .unwrap_or_else(|| "execution stopped".to_string()),
    )
    .for_execution(&exec.execution_id)
    .with_error_code(exec.error_code.clone())
    .with_detail(json!({ "job_id": exec.job_id, "target": exec.target.describe() }))
}

/// Only for completions that still counted failed items.
pub fn completed_with_errors(exec: &Execution) -> Option<NewAlert> {
    if exec.failed_count <= 0 {
        return None;
    }
    Some(
        NewAlert::new(
            JOB_COMPLETED_WITH_ERRORS,
            AlertLevel::Warn,
            format!("{} completed with {} failed items", exec.job_id, exec.failed_count),
            format!(
                "processed={} success={} failed={}",
                exec.processed_count, exec.success_count, exec.failed_count
            ),
        )
        .for_execution(&exec.execution_id),
    )
}

pub fn replay_executed(replay: &Execution) -> NewAlert {
    NewAlert::new(
        REPLAY_EXECUTED,
        AlertLevel::Info,
        format!(
            "{} replay started ({})",
            replay.job_id,
            replay.replay_scope.map(|s| s.as_str()).unwrap_or("FULL")
        ),
        format!(
            "operator {} replayed {} for {}: {}",
            replay.operator_id.as_deref().unwrap_or("-"),
            replay.parent_execution_id.as_deref().unwrap_or("-"),
            replay.target.describe(),
            replay.replay_reason.as_deref().unwrap_or("-")
        ),
    )
    .for_execution(&replay.execution_id)
    .with_detail(json!({
        "parent_execution_id": replay.parent_execution_id,
        "replay_scope": replay.replay_scope,
        "target": replay.target,
    }))
}

pub fn version_reactivated(change: &VersionChange, by: &str, reason: &str) -> NewAlert {
    let v = &change.activated;
    NewAlert::new(
        RESULT_VERSION_REACTIVATED,
        AlertLevel::Warn,
        format!("{}/{} reverted to v{}", v.result_type, v.result_id, v.version_no),
        format!("reactivated by {}: {}", by, reason),
    )
    .with_detail(json!({
        "activated_version_id": v.id,
        "deactivated_version_id": change.deactivated.as_ref().map(|d| d.id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionStatus, RunType, TargetWindow};

    fn finished(failed: i64) -> Execution {
        Execution {
            execution_id: "e1".into(),
            job_id: "DAILY_SIM".into(),
            run_type: RunType::Auto,
            status: ExecutionStatus::Success,
            scheduled_at: None,
            started_at: Some(1),
            ended_at: Some(2),
            target: TargetWindow::Unspecified,
            processed_count: 10,
            success_count: 10 - failed,
            failed_count: failed,
            error_code: None,
            error_message: None,
            error_detail: None,
            operator_id: None,
            operator_note: None,
            parent_execution_id: None,
            replay_reason: None,
            replay_scope: None,
            created_at: 1,
            updated_at: 2,
        }
    }

    #[test]
    fn clean_completion_raises_nothing() {
        assert!(completed_with_errors(&finished(0)).is_none());
        let alert = completed_with_errors(&finished(3)).unwrap();
        assert_eq!(alert.level, AlertLevel::Warn);
        assert_eq!(alert.execution_id.as_deref(), Some("e1"));
    }
}
