mod common;

use batchops::execution::{
    ExecutionFilter, ExecutionStatus, LogLevel, NewLogEntry, RunType, StartExecution,
};
use batchops::storage::Page;
use batchops::OpsError;
use common::{ctx, setup, start_daily};

#[tokio::test]
async fn duplicate_start_is_rejected_and_leaves_one_row() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "exec-dup").await;

    let mut again = StartExecution::new("DAILY_SIM", RunType::Auto);
    again.execution_id = Some("exec-dup".to_string());
    let err = ops.start_execution(&ctx("scheduler"), again).await.unwrap_err();
    assert!(matches!(err, OpsError::DuplicateExecution(ref id) if id == "exec-dup"));

    let filter = ExecutionFilter {
        job_id: Some("DAILY_SIM".to_string()),
        ..Default::default()
    };
    assert_eq!(ops.executions().count(&filter).await.unwrap(), 1);
}

#[tokio::test]
async fn start_generates_an_id_and_logs_the_start() {
    let ops = setup().await;
    let exec = ops
        .start_execution(&ctx("scheduler"), StartExecution::new("DAILY_PRICE_LOAD", RunType::Auto))
        .await
        .unwrap();
    assert!(!exec.execution_id.is_empty());
    assert_eq!(exec.status, ExecutionStatus::Running);
    assert!(exec.started_at.is_some());
    assert!(exec.ended_at.is_none());

    let logs = ops.executions().logs(&exec.execution_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].code.as_deref(), Some("EXECUTION_STARTED"));
}

#[tokio::test]
async fn unknown_job_and_missing_operator_are_rejected() {
    let ops = setup().await;
    let err = ops
        .executions()
        .start(StartExecution::new("NO_SUCH_JOB", RunType::Auto))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "JOB_NOT_FOUND");

    let mut manual = StartExecution::new("DAILY_SIM", RunType::Manual);
    manual.operator_id = Some("   ".to_string());
    let err = ops.executions().start(manual).await.unwrap_err();
    assert_eq!(err.code(), "MISSING_OPERATOR");

    let mut replay = StartExecution::new("DAILY_SIM", RunType::Replay);
    replay.operator_id = Some("ops1".to_string());
    let err = ops.executions().start(replay).await.unwrap_err();
    assert_eq!(err.code(), "MISSING_REPLAY_REASON");
}

#[tokio::test]
async fn manual_start_takes_operator_from_context() {
    let ops = setup().await;
    let exec = ops
        .start_execution(&ctx("ops7"), StartExecution::new("DAILY_SIM", RunType::Manual))
        .await
        .unwrap();
    assert_eq!(exec.run_type, RunType::Manual);
    assert_eq!(exec.operator_id.as_deref(), Some("ops7"));
}

#[tokio::test]
async fn terminal_states_do_not_move() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "exec-term").await;
    ops.update_progress(&ctx("worker"), "exec-term", 10, 9, 1)
        .await
        .unwrap();
    let done = ops
        .complete_execution(&ctx("worker"), "exec-term", Some(100), Some(99))
        .await
        .unwrap();
    assert_eq!(done.status, ExecutionStatus::Success);
    assert_eq!(done.processed_count, 100);

    let ended_at = done.ended_at;
    let err = ops
        .fail_execution(&ctx("worker"), "exec-term", "C1-BAT-001", "late failure", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let err = ops
        .stop_execution(&ctx("ops1"), "exec-term", "too late")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let err = ops
        .update_progress(&ctx("worker"), "exec-term", 200, 200, 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");

    let after = ops.executions().get("exec-term").await.unwrap();
    assert_eq!(after.status, ExecutionStatus::Success);
    assert_eq!(after.ended_at, ended_at);
    assert_eq!(after.processed_count, 100);
}

#[tokio::test]
async fn progress_counts_are_validated() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "exec-counts").await;
    for (p, s, f) in [(-1, 0, 0), (10, 8, 5)] {
        let err = ops
            .update_progress(&ctx("worker"), "exec-counts", p, s, f)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION", "{p}/{s}/{f}");
    }
    let exec = ops.executions().get("exec-counts").await.unwrap();
    assert_eq!(exec.processed_count, 0);
}

#[tokio::test]
async fn stop_records_operator_reason_and_alert() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_RISK_SNAPSHOT", "exec-stop").await;
    let stopped = ops
        .stop_execution(&ctx("ops1"), "exec-stop", "vendor feed frozen")
        .await
        .unwrap();
    assert_eq!(stopped.status, ExecutionStatus::Stopped);
    assert_eq!(stopped.error_code.as_deref(), Some("MANUAL_STOP"));
    assert_eq!(
        stopped.error_message.as_deref(),
        Some("stopped by ops1: vendor feed frozen")
    );

    let logs = ops.executions().logs("exec-stop").await.unwrap();
    let last = logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Warn);
    assert_eq!(last.code.as_deref(), Some("MANUAL_STOP"));

    let alerts = ops
        .alerts()
        .list_alerts(&Default::default(), Page::default())
        .await
        .unwrap();
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == "JOB_STOPPED" && a.execution_id.as_deref() == Some("exec-stop")));
}

#[tokio::test]
async fn stop_requires_a_reason() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "exec-noreason").await;
    let err = ops
        .stop_execution(&ctx("ops1"), "exec-noreason", "  ")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_REASON");
    let exec = ops.executions().get("exec-noreason").await.unwrap();
    assert_eq!(exec.status, ExecutionStatus::Running);
}

#[tokio::test]
async fn logs_can_be_appended_after_the_end() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "exec-logs").await;
    ops.fail_execution(&ctx("worker"), "exec-logs", "C1-BAT-001", "price feed missing", None)
        .await
        .unwrap();
    ops.executions()
        .append_log(
            "exec-logs",
            NewLogEntry::new(LogLevel::Info, "DIAGNOSTIC", "upstream confirmed outage"),
        )
        .await
        .unwrap();
    let logs = ops.executions().logs("exec-logs").await.unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[1].level, LogLevel::Error);
    assert_eq!(logs[1].code.as_deref(), Some("C1-BAT-001"));
    assert_eq!(logs[2].category, "DIAGNOSTIC");
}

#[tokio::test]
async fn stats_count_each_status() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "s-1").await;
    start_daily(&ops, "DAILY_SIM", "s-2").await;
    start_daily(&ops, "DAILY_SIM", "s-3").await;
    ops.complete_execution(&ctx("w"), "s-1", None, None)
        .await
        .unwrap();
    ops.fail_execution(&ctx("w"), "s-2", "E1", "boom", None)
        .await
        .unwrap();

    let stats = ops.executions().stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.stopped, 0);
}
