use crate::app_state::AppEvent;
use batchops::alert::AlertFilter;
use batchops::audit::AuditFilter;
use batchops::execution::ExecutionFilter;
use batchops::storage::{Page, MAX_PAGE_SIZE};
use batchops::ControlPlane;
use tokio::sync::mpsc;

/// Pushes fresh executions, stats and alerts to the UI.
pub async fn refresh_ui(ops: &ControlPlane, tx: &mpsc::UnboundedSender<AppEvent>) {
    let page = Page::new(Some(MAX_PAGE_SIZE), None);

    match ops
        .executions()
        .list(&ExecutionFilter::default(), page)
        .await
    {
        Ok(list) => {
            let _ = tx.send(AppEvent::Executions(list));
        }
        Err(e) => log::warn!("⚠ execution refresh failed: {}", e),
    }

    if let Ok(stats) = ops.executions().stats().await {
        let _ = tx.send(AppEvent::Stats(stats));
    }

    if let Ok(alerts) = ops.alerts().list_alerts(&AlertFilter::default(), page).await {
        let _ = tx.send(AppEvent::Alerts(alerts));
    }
}

pub async fn refresh_audit(
    ops: &ControlPlane,
    target_id: Option<String>,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let filter = AuditFilter {
        target_id,
        ..Default::default()
    };
    match ops
        .audit()
        .list(&filter, Page::new(Some(MAX_PAGE_SIZE), None))
        .await
    {
        Ok(entries) => {
            let _ = tx.send(AppEvent::Audit(entries));
        }
        Err(e) => {
            let _ = tx.send(AppEvent::Error(format!("✗ 审计查询失败: {}", e)));
        }
    }
}
