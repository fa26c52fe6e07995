pub mod model;
pub mod service;

pub use model::{ReactivateVersion, ResultVersion, VersionChange};
pub use service::VersionService;
