pub mod alert_repo;
pub mod approval_repo;
pub mod audit_repo;
pub mod execution_repo;
pub mod idempotency_repo;
pub mod job_repo;
pub mod version_repo;

pub use alert_repo::AlertRepository;
pub use approval_repo::ApprovalRepository;
pub use audit_repo::AuditRepository;
pub use execution_repo::ExecutionRepository;
pub use idempotency_repo::IdempotencyRepository;
pub use job_repo::JobRepository;
pub use version_repo::VersionRepository;
