use crate::storage::entity::result_version;
use serde::{Deserialize, Serialize};

/// One numbered version of a computed artifact. The artifact's content lives
/// elsewhere; this is only its envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultVersion {
    pub id: i32,
    pub result_type: String,
    pub result_id: String,
    pub version_no: i32,
    pub is_active: bool,
    pub execution_id: Option<String>,
    pub created_at: i64,
    pub deactivated_at: Option<i64>,
    pub deactivated_by: Option<String>,
    pub deactivation_reason: Option<String>,
    pub superseded_by: Option<i32>,
    pub reactivated_at: Option<i64>,
    pub reactivated_by: Option<String>,
    pub reactivation_reason: Option<String>,
}

impl From<result_version::Model> for ResultVersion {
    fn from(m: result_version::Model) -> Self {
        Self {
            id: m.id,
            result_type: m.result_type,
            result_id: m.result_id,
            version_no: m.version_no,
            is_active: m.is_active,
            execution_id: m.execution_id,
            created_at: m.created_at,
            deactivated_at: m.deactivated_at,
            deactivated_by: m.deactivated_by,
            deactivation_reason: m.deactivation_reason,
            superseded_by: m.superseded_by,
            reactivated_at: m.reactivated_at,
            reactivated_by: m.reactivated_by,
            reactivation_reason: m.reactivation_reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReactivateVersion {
    pub version_id: i32,
    pub reactivated_by: String,
    pub reason: String,
    /// The version the caller saw active (None: nothing was active). The swap
    /// only happens while that still holds.
    pub expected_active_version_id: Option<i32>,
}

impl ReactivateVersion {
    pub fn new(
        version_id: i32,
        reactivated_by: &str,
        reason: &str,
        expected_active_version_id: Option<i32>,
    ) -> Self {
        Self {
            version_id,
            reactivated_by: reactivated_by.to_string(),
            reason: reason.to_string(),
            expected_active_version_id,
        }
    }
}

/// Result of a create or reactivate: the version now active and the one it
/// displaced, as they stood after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub activated: ResultVersion,
    pub deactivated: Option<ResultVersion>,
}
