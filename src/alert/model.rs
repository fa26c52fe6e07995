use crate::error::OpsError;
use crate::storage::entity::alert;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warn => "WARN",
            AlertLevel::Error => "ERROR",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl FromStr for AlertLevel {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(AlertLevel::Info),
            "WARN" | "WARNING" => Ok(AlertLevel::Warn),
            "ERROR" => Ok(AlertLevel::Error),
            "CRITICAL" => Ok(AlertLevel::Critical),
            other => Err(OpsError::InvariantViolation(format!(
                "unknown alert level {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    Email,
    Chat,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "EMAIL",
            ChannelKind::Chat => "CHAT",
            ChannelKind::Webhook => "WEBHOOK",
        }
    }

    /// Severity-driven default: email always, chat from ERROR up, webhook
    /// only for CRITICAL.
    pub fn defaults_for(level: AlertLevel) -> Vec<ChannelKind> {
        match level {
            AlertLevel::Info | AlertLevel::Warn => vec![ChannelKind::Email],
            AlertLevel::Error => vec![ChannelKind::Email, ChannelKind::Chat],
            AlertLevel::Critical => {
                vec![ChannelKind::Email, ChannelKind::Chat, ChannelKind::Webhook]
            }
        }
    }
}

pub const JOB_FAILED: &str = "JOB_FAILED";
pub const JOB_STOPPED: &str = "JOB_STOPPED";
pub const REPLAY_EXECUTED: &str = "REPLAY_EXECUTED";
pub const RESULT_VERSION_REACTIVATED: &str = "RESULT_VERSION_REACTIVATED";
pub const JOB_COMPLETED_WITH_ERRORS: &str = "JOB_COMPLETED_WITH_ERRORS";

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: String,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub execution_id: Option<String>,
    pub error_code: Option<String>,
    pub detail: Option<Value>,
    /// None selects channels by severity.
    pub channels: Option<Vec<ChannelKind>>,
}

impl NewAlert {
    pub fn new(alert_type: &str, level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            level,
            title: title.into(),
            message: message.into(),
            execution_id: None,
            error_code: None,
            detail: None,
            channels: None,
        }
    }

    pub fn for_execution(mut self, execution_id: &str) -> Self {
        self.execution_id = Some(execution_id.to_string());
        self
    }

    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn on_channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = Some(channels);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i32,
    pub alert_type: String,
    pub level: AlertLevel,
    pub execution_id: Option<String>,
    pub error_code: Option<String>,
    pub title: String,
    pub message: String,
    pub detail: Option<Value>,
    /// Selected and configured at creation. Whether each channel accepted the
    /// alert is reported by the dispatch task, not stored here.
    pub channels_sent: Vec<ChannelKind>,
    /// Dispatch hand-off time.
    pub sent_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<i64>,
    pub created_at: i64,
}

impl Alert {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_by.is_some()
    }
}

impl TryFrom<alert::Model> for Alert {
    type Error = OpsError;

    fn try_from(m: alert::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            level: m.alert_level.parse()?,
            channels_sent: serde_json::from_str(&m.channels_sent)?,
            detail: m.detail.as_deref().and_then(|d| serde_json::from_str(d).ok()),
            id: m.id,
            alert_type: m.alert_type,
            execution_id: m.execution_id,
            error_code: m.error_code,
            title: m.title,
            message: m.message,
            sent_at: m.sent_at,
            acknowledged_by: m.acknowledged_by,
            acknowledged_at: m.acknowledged_at,
            created_at: m.created_at,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub alert_type: Option<String>,
    pub level: Option<AlertLevel>,
    pub execution_id: Option<String>,
    pub acknowledged: Option<bool>,
}

/// Per-channel delivery outcome of one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub alert_id: i32,
    pub delivered: Vec<ChannelKind>,
    pub failed: Vec<(ChannelKind, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channels_escalate_with_severity() {
        assert_eq!(ChannelKind::defaults_for(AlertLevel::Info), vec![ChannelKind::Email]);
        assert_eq!(ChannelKind::defaults_for(AlertLevel::Warn), vec![ChannelKind::Email]);
        assert_eq!(
            ChannelKind::defaults_for(AlertLevel::Error),
            vec![ChannelKind::Email, ChannelKind::Chat]
        );
        assert!(ChannelKind::defaults_for(AlertLevel::Critical).contains(&ChannelKind::Webhook));
    }

    #[test]
    fn channels_sent_is_stored_as_json_array() {
        let json = serde_json::to_string(&vec![ChannelKind::Email, ChannelKind::Chat]).unwrap();
        assert_eq!(json, r#"["EMAIL","CHAT"]"#);
    }
}
