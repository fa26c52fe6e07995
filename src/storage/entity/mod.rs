pub mod alert;
pub mod approval;
pub mod audit_log;
pub mod execution;
pub mod execution_log;
pub mod idempotency_record;
pub mod job;
pub mod result_version;

pub use alert::Entity as OpsAlert;
pub use approval::Entity as Approval;
pub use audit_log::Entity as AuditLog;
pub use execution::Entity as Execution;
pub use execution_log::Entity as ExecutionLog;
pub use idempotency_record::Entity as IdempotencyRecord;
pub use job::Entity as Job;
pub use result_version::Entity as ResultVersion;
