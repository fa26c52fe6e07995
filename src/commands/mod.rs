pub mod app_command;

pub use app_command::AppCommand;

use crate::app_service::{refresh_audit, refresh_ui};
use crate::app_state::{AppEvent, ExecutionDetail};
use batchops::control::RESULT_VERSION_ACTIVATE;
use batchops::execution::{StartExecution, TargetWindow};
use batchops::registry::JobRegistry;
use batchops::replay::ReplayRequest;
use batchops::{ControlPlane, OpsResult, RequestContext};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Runs console commands against the control plane as one operator.
pub struct Console {
    pub ops: ControlPlane,
    pub db: Arc<DatabaseConnection>,
    pub operator_id: String,
    pub operator_role: String,
}

impl Console {
    fn ctx(&self) -> RequestContext {
        RequestContext::new(
            &Uuid::new_v4().to_string(),
            &self.operator_id,
            &self.operator_role,
        )
    }

    /// Each console submission is a fresh request, so it gets a fresh key.
    fn keyed_ctx(&self) -> RequestContext {
        self.ctx()
            .with_idempotency_key(&format!("console-{}", Uuid::new_v4()))
    }

    pub async fn handle(&self, cmd: AppCommand, tx: &mpsc::UnboundedSender<AppEvent>) {
        let refresh = !matches!(
            cmd,
            AppCommand::Detail { .. }
                | AppCommand::Audit { .. }
                | AppCommand::Jobs
                | AppCommand::Help
                | AppCommand::Quit
                | AppCommand::Unknown(_)
                | AppCommand::VersionList { .. }
        );
        match self.run(cmd, tx).await {
            Ok(Some(msg)) => {
                let _ = tx.send(AppEvent::Message(format!("✓ {}", msg)));
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("⚠ console command failed: [{}] {}", e.code(), e);
                let _ = tx.send(AppEvent::Error(format!("✗ [{}] {}", e.code(), e)));
            }
        }
        if refresh {
            refresh_ui(&self.ops, tx).await;
        }
    }

    async fn run(
        &self,
        cmd: AppCommand,
        tx: &mpsc::UnboundedSender<AppEvent>,
    ) -> OpsResult<Option<String>> {
        let msg = match cmd {
            AppCommand::Start {
                job_id,
                run_type,
                date,
                note,
            } => {
                let mut req = StartExecution::new(job_id, run_type);
                req.target = date.map_or(TargetWindow::Unspecified, |date| TargetWindow::Day {
                    date,
                });
                req.operator_note = note;
                let exec = self.ops.start_execution(&self.keyed_ctx(), req).await?;
                format!("已启动 {} [{}]", exec.execution_id, exec.job_id)
            }
            AppCommand::Progress {
                execution_id,
                processed,
                success,
                failed,
            } => {
                let exec = self
                    .ops
                    .update_progress(&self.ctx(), &execution_id, processed, success, failed)
                    .await?;
                format!(
                    "{} 进度 {}/{}/{}",
                    exec.execution_id,
                    exec.processed_count,
                    exec.success_count,
                    exec.failed_count
                )
            }
            AppCommand::Complete {
                execution_id,
                processed,
                success,
            } => {
                let exec = self
                    .ops
                    .complete_execution(&self.ctx(), &execution_id, processed, success)
                    .await?;
                format!("{} 已完成", exec.execution_id)
            }
            AppCommand::Fail {
                execution_id,
                error_code,
                message,
            } => {
                let exec = self
                    .ops
                    .fail_execution(&self.ctx(), &execution_id, &error_code, &message, None)
                    .await?;
                format!("{} 已标记失败 [{}]", exec.execution_id, error_code)
            }
            AppCommand::Stop {
                execution_id,
                reason,
            } => {
                let exec = self
                    .ops
                    .stop_execution(&self.keyed_ctx(), &execution_id, &reason)
                    .await?;
                format!("{} 已停止", exec.execution_id)
            }
            AppCommand::Replay {
                job_id,
                target,
                parent,
                reason,
            } => {
                let mut req = ReplayRequest::new(&job_id, &self.operator_id, &reason);
                if let Some(p) = parent.as_deref() {
                    req = req.with_parent(p);
                }
                let exec = self.ops.replay(&self.keyed_ctx(), req, target).await?;
                format!(
                    "已发起重跑 {} ({}), 父执行 {}",
                    exec.execution_id,
                    exec.target.describe(),
                    exec.parent_execution_id.as_deref().unwrap_or("-")
                )
            }
            AppCommand::VersionCreate {
                result_type,
                result_id,
                execution_id,
            } => {
                let change = self
                    .ops
                    .create_version(&self.ctx(), &result_type, &result_id, execution_id.as_deref())
                    .await?;
                format!(
                    "{}/{} 新版本 v{} (id {})",
                    result_type, result_id, change.activated.version_no, change.activated.id
                )
            }
            AppCommand::VersionList {
                result_type,
                result_id,
            } => {
                let versions = self
                    .ops
                    .versions()
                    .list_versions(&result_type, &result_id)
                    .await?;
                for v in &versions {
                    let _ = tx.send(AppEvent::Log(format!(
                        "  v{} id={} {}{}",
                        v.version_no,
                        v.id,
                        if v.is_active { "ACTIVE" } else { "inactive" },
                        v.deactivation_reason
                            .as_deref()
                            .map(|r| format!(" ({})", r))
                            .unwrap_or_default()
                    )));
                }
                format!("{}/{} 共 {} 个版本", result_type, result_id, versions.len())
            }
            AppCommand::VersionActivate {
                version_id,
                approval_id,
                expected,
                reason,
            } => {
                let change = self
                    .ops
                    .reactivate_version(&self.ctx(), approval_id, version_id, &reason, expected)
                    .await?;
                format!(
                    "版本 {} 已重新激活{}",
                    change.activated.id,
                    change
                        .deactivated
                        .map(|d| format!(", 版本 {} 已停用", d.id))
                        .unwrap_or_default()
                )
            }
            AppCommand::ApprovalRequest { version_id, reason } => {
                let approval = self
                    .ops
                    .request_approval(
                        &self.ctx(),
                        RESULT_VERSION_ACTIVATE,
                        Some("RESULT_VERSION"),
                        Some(&version_id.to_string()),
                        &reason,
                    )
                    .await?;
                format!("审批 #{} 已提交 (版本 {})", approval.id, version_id)
            }
            AppCommand::ApprovalDecide {
                approval_id,
                approve,
                reason,
            } => {
                let approval = self
                    .ops
                    .decide_approval(&self.ctx(), approval_id, approve, &reason)
                    .await?;
                format!("审批 #{} -> {}", approval.id, approval.status)
            }
            AppCommand::Ack { alert_id } => {
                let alert = self.ops.acknowledge_alert(&self.ctx(), alert_id).await?;
                format!("告警 #{} 已确认", alert.id)
            }
            AppCommand::Detail { execution_id } => {
                let execution = self.ops.executions().get(&execution_id).await?;
                let logs = self.ops.executions().logs(&execution_id).await?;
                let replays = self.ops.replays().replays_of(&execution_id).await?;
                let _ = tx.send(AppEvent::Detail(Box::new(ExecutionDetail {
                    execution,
                    logs,
                    replays,
                })));
                return Ok(None);
            }
            AppCommand::Audit { target_id } => {
                refresh_audit(&self.ops, target_id, tx).await;
                return Ok(None);
            }
            AppCommand::Jobs => {
                let jobs = JobRegistry::list(self.db.as_ref()).await?;
                for j in &jobs {
                    let _ = tx.send(AppEvent::Log(format!(
                        "  {:<22} {:<8} {}{}",
                        j.job_id,
                        j.cadence.as_str(),
                        j.display_name,
                        if j.active { "" } else { " (停用)" }
                    )));
                }
                format!("共 {} 个作业", jobs.len())
            }
            AppCommand::Help => {
                let _ = tx.send(AppEvent::Message(app_command::HELP.to_string()));
                return Ok(None);
            }
            AppCommand::Quit => "按 q 退出控制台".to_string(),
            AppCommand::Unknown(msg) => {
                let _ = tx.send(AppEvent::Error(format!("✗ {}", msg)));
                return Ok(None);
            }
        };
        Ok(Some(msg))
    }
}
