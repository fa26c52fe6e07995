pub mod service;

pub use service::{ReplayRequest, ReplayService};
