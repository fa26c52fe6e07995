pub mod alert;
pub mod audit;
pub mod config;
pub mod control;
pub mod error;
pub mod execution;
pub mod registry;
pub mod replay;
pub mod storage;
pub mod versioning;

pub use control::{ControlPlane, RequestContext};
pub use error::{OpsError, OpsResult};
