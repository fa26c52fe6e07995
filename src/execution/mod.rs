pub mod model;
pub mod service;
pub mod transitions;

pub use model::{
    Execution, ExecutionFilter, ExecutionLogEntry, ExecutionStats, ExecutionStatus, LogLevel,
    NewLogEntry, ReplayScope, RunType, StartExecution, TargetWindow,
};
pub use service::ExecutionService;
pub use transitions::{check_transition, next_status, LifecycleAction};
