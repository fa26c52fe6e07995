use sea_orm::DbErr;

pub type OpsResult<T> = Result<T, OpsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Job,
    Execution,
    ResultVersion,
    Alert,
    Approval,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Job => "job",
            Entity::Execution => "execution",
            Entity::ResultVersion => "result version",
            Entity::Alert => "alert",
            Entity::Approval => "approval",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OpsError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("execution already exists: {0}")]
    DuplicateExecution(String),
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
    #[error("approval invalid: {0}")]
    ApprovalInvalid(String),
    #[error("alert {0} already acknowledged")]
    AlreadyAcknowledged(i32),
    #[error("result version {0} is already active")]
    AlreadyActive(i32),
    #[error("version conflict: {0}")]
    VersionConflict(String),
    #[error("request with idempotency key {0} is still in progress")]
    IdempotencyInProgress(String),
    #[error("idempotency key {key} was already used for {operation}")]
    IdempotencyKeyReused { key: String, operation: String },
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OpsError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        OpsError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code, surfaced to callers next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            OpsError::NotFound { entity, .. } => match entity {
                Entity::Job => "JOB_NOT_FOUND",
                Entity::Execution => "EXECUTION_NOT_FOUND",
                Entity::ResultVersion => "VERSION_NOT_FOUND",
                Entity::Alert => "ALERT_NOT_FOUND",
                Entity::Approval => "APPROVAL_NOT_FOUND",
            },
            OpsError::InvalidTransition(_) => "INVALID_TRANSITION",
            OpsError::DuplicateExecution(_) => "DUPLICATE_EXECUTION",
            OpsError::MissingRequiredField(field) => match *field {
                "operator_id" => "MISSING_OPERATOR",
                "reason" => "MISSING_REASON",
                "replay_reason" => "MISSING_REPLAY_REASON",
                _ => "MISSING_REQUIRED_FIELD",
            },
            OpsError::InvalidRange { .. } => "INVALID_RANGE",
            OpsError::ApprovalInvalid(_) => "APPROVAL_INVALID",
            OpsError::AlreadyAcknowledged(_) => "ALREADY_ACKNOWLEDGED",
            OpsError::AlreadyActive(_) => "ALREADY_ACTIVE",
            OpsError::VersionConflict(_) => "VERSION_CONFLICT",
            OpsError::IdempotencyInProgress(_) => "IDEMPOTENCY_IN_PROGRESS",
            OpsError::IdempotencyKeyReused { .. } => "IDEMPOTENCY_KEY_REUSED",
            OpsError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            OpsError::Storage(_) => "STORAGE_ERROR",
            OpsError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Lock contention and pool exhaustion; everything else is surfaced as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            OpsError::Storage(err) => is_transient_db_err(err),
            _ => false,
        }
    }
}

pub(crate) fn is_transient_db_err(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        other => {
            let msg = other.to_string().to_ascii_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
    }
}

/// Rejects `None`, empty and whitespace-only values.
pub fn require(value: Option<&str>, field: &'static str) -> OpsResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(OpsError::MissingRequiredField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_codes_are_specific() {
        assert_eq!(
            OpsError::MissingRequiredField("operator_id").code(),
            "MISSING_OPERATOR"
        );
        assert_eq!(
            OpsError::MissingRequiredField("replay_reason").code(),
            "MISSING_REPLAY_REASON"
        );
        assert_eq!(
            OpsError::MissingRequiredField("target_id").code(),
            "MISSING_REQUIRED_FIELD"
        );
    }

    #[test]
    fn require_trims_and_rejects_blank() {
        assert_eq!(require(Some("  ops1 "), "operator_id").unwrap(), "ops1");
        assert!(matches!(
            require(Some("   "), "reason"),
            Err(OpsError::MissingRequiredField("reason"))
        ));
        assert!(require(None, "reason").is_err());
    }

    #[test]
    fn lock_contention_is_transient() {
        let err = OpsError::Storage(DbErr::Custom("database is locked".to_string()));
        assert!(err.is_transient());
        assert!(!OpsError::InvalidTransition("x".to_string()).is_transient());
    }
}
