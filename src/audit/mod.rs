pub mod model;
pub mod service;

pub use model::{AuditAction, AuditFilter, AuditLogEntry, AuditSnapshot, NewAuditEntry};
pub use service::AuditService;
