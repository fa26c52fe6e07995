mod common;

use batchops::audit::{AuditAction, AuditFilter};
use batchops::execution::{ExecutionStatus, ReplayScope, RunType, TargetWindow};
use batchops::replay::ReplayRequest;
use batchops::storage::Page;
use common::{ctx, day, setup, start_daily};

#[tokio::test]
async fn failed_daily_sim_is_replayed_for_the_full_day() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "sim-0301").await;
    let failed = ops
        .fail_execution(&ctx("worker"), "sim-0301", "C1-BAT-001", "price feed missing", None)
        .await
        .unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);

    let req = ReplayRequest::new("DAILY_SIM", "ops1", "price feed restored");
    let replay = ops
        .replay_full(&ctx("ops1"), req, day(2024, 3, 1))
        .await
        .unwrap();

    assert_eq!(replay.run_type, RunType::Replay);
    assert_eq!(replay.status, ExecutionStatus::Running);
    assert_eq!(replay.parent_execution_id.as_deref(), Some("sim-0301"));
    assert_eq!(replay.replay_scope, Some(ReplayScope::Full));
    assert_eq!(replay.replay_reason.as_deref(), Some("price feed restored"));
    assert_eq!(replay.operator_id.as_deref(), Some("ops1"));
    assert_eq!(replay.target, TargetWindow::Day { date: day(2024, 3, 1) });

    // the parent keeps its failure
    let parent = ops.executions().get("sim-0301").await.unwrap();
    assert_eq!(parent.status, ExecutionStatus::Failed);
    assert_eq!(parent.error_code.as_deref(), Some("C1-BAT-001"));

    let children = ops.replays().replays_of("sim-0301").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].execution_id, replay.execution_id);

    let alerts = ops
        .alerts()
        .list_alerts(&Default::default(), Page::default())
        .await
        .unwrap();
    assert!(alerts.iter().any(|a| a.alert_type == "JOB_FAILED"));
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == "REPLAY_EXECUTED"
            && a.execution_id.as_deref() == Some(replay.execution_id.as_str())));

    let audit = ops
        .audit()
        .list(
            &AuditFilter {
                action_type: Some(AuditAction::ExecutionReplay),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].target_id, replay.execution_id);
    assert_eq!(audit[0].reason, "price feed restored");
    assert!(audit[0].before_state.is_some());
}

#[tokio::test]
async fn inverted_range_is_rejected_before_anything_is_written() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "sim-range").await;
    ops.fail_execution(&ctx("w"), "sim-range", "E1", "boom", None)
        .await
        .unwrap();

    let req = ReplayRequest::new("DAILY_SIM", "ops1", "backfill");
    let err = ops
        .replay_range(&ctx("ops1"), req, day(2024, 3, 5), day(2024, 3, 1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_RANGE");
    assert!(ops.replays().replays_of("sim-range").await.unwrap().is_empty());
}

#[tokio::test]
async fn range_and_single_replays_record_their_window() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_RISK_SNAPSHOT", "risk-1").await;
    ops.stop_execution(&ctx("ops1"), "risk-1", "bad inputs")
        .await
        .unwrap();

    let range = ops
        .replay_range(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_RISK_SNAPSHOT", "ops1", "rerun week").with_parent("risk-1"),
            day(2024, 3, 1),
            day(2024, 3, 5),
        )
        .await
        .unwrap();
    assert_eq!(range.replay_scope, Some(ReplayScope::Range));
    assert_eq!(range.target.describe(), "2024-03-01..2024-03-05");

    let single = ops
        .replay_single(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_RISK_SNAPSHOT", "ops1", "one book").with_parent("risk-1"),
            "PORTFOLIO",
            "P-42",
        )
        .await
        .unwrap();
    assert_eq!(single.replay_scope, Some(ReplayScope::Single));
    assert_eq!(single.target.describe(), "PORTFOLIO:P-42");
    assert_eq!(ops.replays().replays_of("risk-1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn replay_needs_reason_and_a_parent() {
    let ops = setup().await;
    let err = ops
        .replay_full(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_SIM", "ops1", "   "),
            day(2024, 3, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_REPLAY_REASON");

    // nothing failed yet, so there is no default parent
    let err = ops
        .replay_full(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_SIM", "ops1", "rerun"),
            day(2024, 3, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_REQUIRED_FIELD");

    let err = ops
        .replay_full(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_SIM", "ops1", "rerun").with_parent("ghost"),
            day(2024, 3, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EXECUTION_NOT_FOUND");
}

#[tokio::test]
async fn replays_can_be_chained() {
    let ops = setup().await;
    start_daily(&ops, "DAILY_SIM", "chain-0").await;
    ops.fail_execution(&ctx("w"), "chain-0", "E1", "boom", None)
        .await
        .unwrap();
    let first = ops
        .replay_full(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_SIM", "ops1", "first try"),
            day(2024, 3, 1),
        )
        .await
        .unwrap();
    ops.fail_execution(&ctx("w"), &first.execution_id, "E1", "boom again", None)
        .await
        .unwrap();
    let second = ops
        .replay_full(
            &ctx("ops1"),
            ReplayRequest::new("DAILY_SIM", "ops1", "second try").with_parent(&first.execution_id),
            day(2024, 3, 1),
        )
        .await
        .unwrap();
    assert_eq!(first.parent_execution_id.as_deref(), Some("chain-0"));
    assert_eq!(
        second.parent_execution_id.as_deref(),
        Some(first.execution_id.as_str())
    );
    assert_eq!(second.run_type, RunType::Replay);
}
