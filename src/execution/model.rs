use crate::error::{OpsError, OpsResult};
use crate::storage::entity::{execution, execution_log};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 4] = [
        ExecutionStatus::Running,
        ExecutionStatus::Success,
        ExecutionStatus::Failed,
        ExecutionStatus::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Stopped => "STOPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl FromStr for ExecutionStatus {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "STOPPED" => Ok(ExecutionStatus::Stopped),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown execution status {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunType {
    Auto,
    Manual,
    Replay,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Auto => "AUTO",
            RunType::Manual => "MANUAL",
            RunType::Replay => "REPLAY",
        }
    }

    /// MANUAL and REPLAY runs are operator actions and must name the operator.
    pub fn requires_operator(&self) -> bool {
        !matches!(self, RunType::Auto)
    }
}

impl FromStr for RunType {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Ok(RunType::Auto),
            "MANUAL" => Ok(RunType::Manual),
            "REPLAY" => Ok(RunType::Replay),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown run type {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayScope {
    Full,
    Range,
    Single,
}

impl ReplayScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayScope::Full => "FULL",
            ReplayScope::Range => "RANGE",
            ReplayScope::Single => "SINGLE",
        }
    }
}

impl FromStr for ReplayScope {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(ReplayScope::Full),
            "RANGE" => Ok(ReplayScope::Range),
            "SINGLE" => Ok(ReplayScope::Single),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown replay scope {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl FromStr for LogLevel {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown log level {}",
                other
            ))),
        }
    }
}

/// The slice of work an execution covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetWindow {
    #[default]
    Unspecified,
    Day {
        date: NaiveDate,
    },
    Range {
        start: NaiveDate,
        end: NaiveDate,
    },
    Single {
        target_type: String,
        target_id: String,
    },
}

impl TargetWindow {
    pub fn validate(&self) -> OpsResult<()> {
        match self {
            TargetWindow::Range { start, end } if start > end => Err(OpsError::InvalidRange {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            }),
            TargetWindow::Single {
                target_type,
                target_id,
            } => {
                if target_type.trim().is_empty() {
                    return Err(OpsError::MissingRequiredField("target_type"));
                }
                if target_id.trim().is_empty() {
                    return Err(OpsError::MissingRequiredField("target_id"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TargetWindow::Unspecified => "-".to_string(),
            TargetWindow::Day { date } => date.format(DATE_FORMAT).to_string(),
            TargetWindow::Range { start, end } => format!(
                "{}..{}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            ),
            TargetWindow::Single {
                target_type,
                target_id,
            } => format!("{}:{}", target_type, target_id),
        }
    }

    fn from_columns(model: &execution::Model) -> OpsResult<Self> {
        if let (Some(target_type), Some(target_id)) = (&model.target_type, &model.target_id) {
            return Ok(TargetWindow::Single {
                target_type: target_type.clone(),
                target_id: target_id.clone(),
            });
        }
        if let (Some(start), Some(end)) = (&model.target_start_date, &model.target_end_date) {
            return Ok(TargetWindow::Range {
                start: parse_date(start)?,
                end: parse_date(end)?,
            });
        }
        if let Some(date) = &model.target_date {
            return Ok(TargetWindow::Day {
                date: parse_date(date)?,
            });
        }
        Ok(TargetWindow::Unspecified)
    }
}

pub fn parse_date(s: &str) -> OpsResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| OpsError::InvariantViolation(format!("bad date {}: {}", s, e)))
}

/// Parameters of a start request. Optional fields follow the run type rules
/// checked by the lifecycle service.
#[derive(Debug, Clone, Default)]
pub struct StartExecution {
    pub job_id: String,
    pub run_type: Option<RunType>,
    pub target: TargetWindow,
    pub scheduled_at: Option<i64>,
    pub operator_id: Option<String>,
    pub operator_note: Option<String>,
    pub execution_id: Option<String>,
    pub parent_execution_id: Option<String>,
    pub replay_reason: Option<String>,
    pub replay_scope: Option<ReplayScope>,
}

impl StartExecution {
    pub fn new(job_id: impl Into<String>, run_type: RunType) -> Self {
        Self {
            job_id: job_id.into(),
            run_type: Some(run_type),
            ..Default::default()
        }
    }

    pub fn run_type(&self) -> RunType {
        self.run_type.unwrap_or(RunType::Auto)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub job_id: String,
    pub run_type: RunType,
    pub status: ExecutionStatus,
    pub scheduled_at: Option<i64>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub target: TargetWindow,
    pub processed_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_detail: Option<Value>,
    pub operator_id: Option<String>,
    pub operator_note: Option<String>,
    pub parent_execution_id: Option<String>,
    pub replay_reason: Option<String>,
    pub replay_scope: Option<ReplayScope>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<execution::Model> for Execution {
    type Error = OpsError;

    fn try_from(model: execution::Model) -> Result<Self, Self::Error> {
        let target = TargetWindow::from_columns(&model)?;
        Ok(Self {
            run_type: model.run_type.parse()?,
            status: model.status.parse()?,
            replay_scope: model
                .replay_scope
                .as_deref()
                .map(ReplayScope::from_str)
                .transpose()?,
            error_detail: model
                .error_detail
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            target,
            execution_id: model.execution_id,
            job_id: model.job_id,
            scheduled_at: model.scheduled_at,
            started_at: model.started_at,
            ended_at: model.ended_at,
            processed_count: model.processed_count,
            success_count: model.success_count,
            failed_count: model.failed_count,
            error_code: model.error_code,
            error_message: model.error_message,
            operator_id: model.operator_id,
            operator_note: model.operator_note,
            parent_execution_id: model.parent_execution_id,
            replay_reason: model.replay_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: i32,
    pub execution_id: String,
    pub level: LogLevel,
    pub category: String,
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<Value>,
    pub created_at: i64,
}

impl TryFrom<execution_log::Model> for ExecutionLogEntry {
    type Error = OpsError;

    fn try_from(model: execution_log::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            level: model.level.parse()?,
            detail: model
                .detail
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            id: model.id,
            execution_id: model.execution_id,
            category: model.category,
            code: model.code,
            message: model.message,
            created_at: model.created_at,
        })
    }
}

/// One diagnostic line to append to an execution's trail.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub category: String,
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<Value>,
}

impl NewLogEntry {
    pub fn new(level: LogLevel, category: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.to_string(),
            code: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: Option<Value>) -> Self {
        self.detail = detail;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub job_id: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub run_type: Option<RunType>,
    pub parent_execution_id: Option<String>,
    pub started_from: Option<i64>,
    pub started_to: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub total: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
    pub stopped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_must_be_ordered() {
        let window = TargetWindow::Range {
            start: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        let err = window.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_RANGE");

        let same_day = TargetWindow::Range {
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert!(same_day.validate().is_ok());
    }

    #[test]
    fn single_target_needs_both_parts() {
        let window = TargetWindow::Single {
            target_type: "SECURITY".to_string(),
            target_id: " ".to_string(),
        };
        assert!(matches!(
            window.validate(),
            Err(OpsError::MissingRequiredField("target_id"))
        ));
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(
            "failed".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Failed
        );
        assert!("PAUSED".parse::<ExecutionStatus>().is_err());
        assert!(ExecutionStatus::Stopped.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
