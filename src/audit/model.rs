use crate::alert::Alert;
use crate::error::OpsError;
use crate::execution::Execution;
use crate::storage::entity::{approval, audit_log};
use crate::versioning::ResultVersion;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ExecutionStart,
    ExecutionComplete,
    ExecutionFail,
    ExecutionStop,
    ExecutionReplay,
    ResultVersionCreate,
    ResultVersionActivate,
    AlertAcknowledge,
    ApprovalDecide,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ExecutionStart => "EXECUTION_START",
            AuditAction::ExecutionComplete => "EXECUTION_COMPLETE",
            AuditAction::ExecutionFail => "EXECUTION_FAIL",
            AuditAction::ExecutionStop => "EXECUTION_STOP",
            AuditAction::ExecutionReplay => "EXECUTION_REPLAY",
            AuditAction::ResultVersionCreate => "RESULT_VERSION_CREATE",
            AuditAction::ResultVersionActivate => "RESULT_VERSION_ACTIVATE",
            AuditAction::AlertAcknowledge => "ALERT_ACKNOWLEDGE",
            AuditAction::ApprovalDecide => "APPROVAL_DECIDE",
        }
    }

    /// The `target_type` recorded with this action.
    pub fn target_type(&self) -> &'static str {
        match self {
            AuditAction::ExecutionStart
            | AuditAction::ExecutionComplete
            | AuditAction::ExecutionFail
            | AuditAction::ExecutionStop
            | AuditAction::ExecutionReplay => "EXECUTION",
            AuditAction::ResultVersionCreate | AuditAction::ResultVersionActivate => {
                "RESULT_VERSION"
            }
            AuditAction::AlertAcknowledge => "ALERT",
            AuditAction::ApprovalDecide => "APPROVAL",
        }
    }
}

impl FromStr for AuditAction {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_ascii_uppercase()))
            .map_err(|_| OpsError::InvariantViolation(format!("unknown audit action {}", s)))
    }
}

/// Typed before/after producers. The store keeps the JSON form only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSnapshot {
    Execution(Execution),
    ResultVersion(ResultVersion),
    Alert(Alert),
    Approval(approval::Model),
}

impl AuditSnapshot {
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Input to the audit service.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub operator_id: String,
    pub operator_role: String,
    pub action: AuditAction,
    pub target_id: String,
    pub reason: String,
    pub request_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub before_state: Option<AuditSnapshot>,
    pub after_state: Option<AuditSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i32,
    pub operator_id: String,
    pub operator_role: String,
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub reason: String,
    pub request_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub created_at: i64,
}

impl From<audit_log::Model> for AuditLogEntry {
    fn from(m: audit_log::Model) -> Self {
        let parse = |s: Option<String>| s.and_then(|raw| serde_json::from_str(&raw).ok());
        Self {
            id: m.id,
            operator_id: m.operator_id,
            operator_role: m.operator_role,
            action_type: m.action_type,
            target_type: m.target_type,
            target_id: m.target_id,
            reason: m.reason,
            request_id: m.request_id,
            idempotency_key: m.idempotency_key,
            before_state: parse(m.before_state),
            after_state: parse(m.after_state),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub action_type: Option<AuditAction>,
    pub operator_id: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip_through_from_str() {
        assert_eq!(
            "result_version_activate".parse::<AuditAction>().unwrap(),
            AuditAction::ResultVersionActivate
        );
        assert!("DELETE_EVERYTHING".parse::<AuditAction>().is_err());
        assert_eq!(AuditAction::ExecutionReplay.target_type(), "EXECUTION");
    }
}
