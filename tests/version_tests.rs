mod common;

use batchops::control::RESULT_VERSION_ACTIVATE;
use batchops::versioning::ReactivateVersion;
use batchops::{ControlPlane, OpsError};
use common::{ctx, setup};

async fn approved(ops: &ControlPlane, version_id: i32) -> i32 {
    let request = ops
        .request_approval(
            &ctx("ops1"),
            RESULT_VERSION_ACTIVATE,
            Some("RESULT_VERSION"),
            Some(&version_id.to_string()),
            "v3 used a stale curve",
        )
        .await
        .unwrap();
    ops.decide_approval(&ctx("lead1"), request.id, true, "confirmed with desk")
        .await
        .unwrap();
    request.id
}

async fn three_versions(ops: &ControlPlane) -> (i32, i32, i32) {
    let mut ids = Vec::new();
    for _ in 0..3 {
        let change = ops
            .create_version(&ctx("worker"), "RISK_REPORT", "2024-03-01", None)
            .await
            .unwrap();
        ids.push(change.activated.id);
    }
    (ids[0], ids[1], ids[2])
}

async fn active_count(ops: &ControlPlane) -> usize {
    ops.versions()
        .list_versions("RISK_REPORT", "2024-03-01")
        .await
        .unwrap()
        .iter()
        .filter(|v| v.is_active)
        .count()
}

#[tokio::test]
async fn create_supersedes_the_previous_version() {
    let ops = setup().await;
    let (v1, v2, v3) = three_versions(&ops).await;
    assert_eq!(active_count(&ops).await, 1);

    let active = ops
        .versions()
        .get_active_version("RISK_REPORT", "2024-03-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, v3);
    assert_eq!(active.version_no, 3);

    let first = ops.versions().get_version(v1).await.unwrap();
    assert!(!first.is_active);
    assert_eq!(first.superseded_by, Some(v2));
    assert!(first.deactivated_at.is_some());

    // an unrelated key keeps its own sequence
    let other = ops
        .create_version(&ctx("worker"), "RISK_REPORT", "2024-03-02", None)
        .await
        .unwrap();
    assert_eq!(other.activated.version_no, 1);
    assert!(other.deactivated.is_none());
}

#[tokio::test]
async fn approved_reactivation_swaps_the_active_version() {
    let ops = setup().await;
    let (v1, _v2, v3) = three_versions(&ops).await;
    let approval_id = approved(&ops, v1).await;

    let change = ops
        .reactivate_version(&ctx("lead1"), approval_id, v1, "revert to pre-curve run", Some(v3))
        .await
        .unwrap();
    assert_eq!(change.activated.id, v1);
    assert!(change.activated.is_active);
    assert_eq!(change.activated.reactivated_by.as_deref(), Some("lead1"));
    let displaced = change.deactivated.unwrap();
    assert_eq!(displaced.id, v3);
    assert_eq!(
        displaced.deactivation_reason.as_deref(),
        Some("revert to pre-curve run")
    );
    assert_eq!(displaced.superseded_by, Some(v1));
    assert_eq!(active_count(&ops).await, 1);

    // consumed: the same approval cannot authorise another activation
    let approval = ops.approvals().get(approval_id).await.unwrap();
    assert_eq!(approval.status, "EXECUTED");
    let err = ops
        .reactivate_version(&ctx("lead1"), approval_id, v3, "undo", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "APPROVAL_INVALID");

    let alerts = ops
        .alerts()
        .list_alerts(&Default::default(), Default::default())
        .await
        .unwrap();
    assert!(alerts
        .iter()
        .any(|a| a.alert_type == "RESULT_VERSION_REACTIVATED"));
}

#[tokio::test]
async fn reactivation_without_a_valid_approval_changes_nothing() {
    let ops = setup().await;
    let (v1, v2, v3) = three_versions(&ops).await;

    let pending = ops
        .request_approval(
            &ctx("ops1"),
            RESULT_VERSION_ACTIVATE,
            Some("RESULT_VERSION"),
            Some(&v1.to_string()),
            "please",
        )
        .await
        .unwrap();
    let wrong_type = ops
        .request_approval(&ctx("ops1"), "EXECUTION_REPLAY", None, None, "other thing")
        .await
        .unwrap();
    ops.decide_approval(&ctx("lead1"), wrong_type.id, true, "ok")
        .await
        .unwrap();
    let other_target = approved(&ops, v2).await;
    let rejected = ops
        .request_approval(
            &ctx("ops1"),
            RESULT_VERSION_ACTIVATE,
            Some("RESULT_VERSION"),
            Some(&v1.to_string()),
            "again",
        )
        .await
        .unwrap();
    ops.decide_approval(&ctx("lead1"), rejected.id, false, "no")
        .await
        .unwrap();

    for approval_id in [9_999, pending.id, wrong_type.id, other_target, rejected.id] {
        let err = ops
            .reactivate_version(&ctx("lead1"), approval_id, v1, "revert", None)
            .await
            .unwrap_err();
        assert!(
            matches!(err, OpsError::ApprovalInvalid(_)),
            "approval {approval_id}: {err}"
        );
    }

    let active = ops
        .versions()
        .get_active_version("RISK_REPORT", "2024-03-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, v3);
}

#[tokio::test]
async fn reactivating_the_active_version_or_a_stale_expectation_fails() {
    let ops = setup().await;
    let (v1, v2, v3) = three_versions(&ops).await;

    let err = ops
        .versions()
        .reactivate_version(ReactivateVersion::new(v3, "lead1", "noop", Some(v3)))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::AlreadyActive(id) if id == v3));

    let err = ops
        .versions()
        .reactivate_version(ReactivateVersion::new(v1, "lead1", "revert", Some(v2)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VERSION_CONFLICT");

    let err = ops
        .versions()
        .reactivate_version(ReactivateVersion::new(v1, "lead1", " ", Some(v3)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_REASON");
    assert_eq!(active_count(&ops).await, 1);
}

#[tokio::test]
async fn concurrent_reactivations_have_one_winner() {
    let ops = setup().await;
    let (v1, v2, v3) = three_versions(&ops).await;

    let versions = ops.versions().clone();
    let (a, b) = tokio::join!(
        versions.reactivate_version(ReactivateVersion::new(v1, "lead1", "revert to v1", Some(v3))),
        versions.reactivate_version(ReactivateVersion::new(v2, "lead2", "revert to v2", Some(v3))),
    );

    let (winner, loser) = match (&a, &b) {
        (Ok(_), Err(e)) => {
            assert_eq!(e.code(), "VERSION_CONFLICT");
            (v1, v2)
        }
        (Err(e), Ok(_)) => {
            assert_eq!(e.code(), "VERSION_CONFLICT");
            (v2, v1)
        }
        other => panic!("expected exactly one winner, got {other:?}"),
    };

    assert_eq!(active_count(&ops).await, 1);
    assert!(ops.versions().get_version(winner).await.unwrap().is_active);
    assert!(!ops.versions().get_version(loser).await.unwrap().is_active);
}

#[tokio::test]
async fn racing_approved_reactivations_have_one_winner() {
    let ops = setup().await;
    let (v1, v2, v3) = three_versions(&ops).await;
    let approval_a = approved(&ops, v1).await;
    let approval_b = approved(&ops, v2).await;

    let (ctx_a, ctx_b) = (ctx("lead1"), ctx("lead2"));
    let (a, b) = tokio::join!(
        ops.reactivate_version(&ctx_a, approval_a, v1, "revert to v1", None),
        ops.reactivate_version(&ctx_b, approval_b, v2, "revert to v2", None),
    );

    let (winner, loser, loser_approval) = match (&a, &b) {
        (Ok(_), Err(e)) => {
            assert_eq!(e.code(), "VERSION_CONFLICT");
            (v1, v2, approval_b)
        }
        (Err(e), Ok(_)) => {
            assert_eq!(e.code(), "VERSION_CONFLICT");
            (v2, v1, approval_a)
        }
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(active_count(&ops).await, 1);
    assert!(ops.versions().get_version(winner).await.unwrap().is_active);
    assert!(!ops.versions().get_version(loser).await.unwrap().is_active);

    // the loser's approval is handed back for a deliberate retry
    let approval = ops.approvals().get(loser_approval).await.unwrap();
    assert_eq!(approval.status, "APPROVED");
}

#[tokio::test]
async fn one_approval_authorises_one_reactivation() {
    let ops = setup().await;
    let (v1, v2, _v3) = three_versions(&ops).await;
    let request = ops
        .request_approval(&ctx("ops1"), RESULT_VERSION_ACTIVATE, None, None, "curve fix")
        .await
        .unwrap();
    ops.decide_approval(&ctx("lead1"), request.id, true, "go")
        .await
        .unwrap();

    let (ctx_a, ctx_b) = (ctx("lead1"), ctx("lead2"));
    let (a, b) = tokio::join!(
        ops.reactivate_version(&ctx_a, request.id, v1, "revert to v1", None),
        ops.reactivate_version(&ctx_b, request.id, v2, "revert to v2", None),
    );
    let outcomes = [&a, &b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes
        .iter()
        .find_map(|r| r.as_ref().err())
        .unwrap();
    assert_eq!(err.code(), "APPROVAL_INVALID");

    assert_eq!(active_count(&ops).await, 1);
    let approval = ops.approvals().get(request.id).await.unwrap();
    assert_eq!(approval.status, "EXECUTED");
}

#[tokio::test]
async fn failed_reactivation_hands_the_approval_back() {
    let ops = setup().await;
    let (v1, v2, _v3) = three_versions(&ops).await;
    let approval_id = approved(&ops, v1).await;

    let err = ops
        .reactivate_version(&ctx("lead1"), approval_id, v1, "revert", Some(v2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VERSION_CONFLICT");
    assert_eq!(ops.approvals().get(approval_id).await.unwrap().status, "APPROVED");

    ops.reactivate_version(&ctx("lead1"), approval_id, v1, "revert", None)
        .await
        .unwrap();
    assert_eq!(ops.approvals().get(approval_id).await.unwrap().status, "EXECUTED");
}

#[tokio::test]
async fn version_changes_are_audited() {
    let ops = setup().await;
    let (v1, _, _) = three_versions(&ops).await;
    let approval_id = approved(&ops, v1).await;
    ops.reactivate_version(&ctx("lead1"), approval_id, v1, "revert", None)
        .await
        .unwrap();

    let entries = ops
        .audit()
        .list(
            &batchops::audit::AuditFilter {
                target_id: Some(v1.to_string()),
                ..Default::default()
            },
            Default::default(),
        )
        .await
        .unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action_type.as_str()).collect();
    assert!(actions.contains(&"RESULT_VERSION_CREATE"));
    assert!(actions.contains(&"RESULT_VERSION_ACTIVATE"));
    let activate = entries
        .iter()
        .find(|e| e.action_type == "RESULT_VERSION_ACTIVATE")
        .unwrap();
    assert_eq!(activate.operator_id, "lead1");
    assert!(activate.before_state.is_some());
    assert!(activate.after_state.is_some());
}
