pub mod channel;
pub mod derived;
pub mod model;
pub mod service;

pub use channel::{AlertChannel, AlertDispatcher, ChannelError, ChatChannel, EmailChannel, WebhookChannel};
pub use model::{Alert, AlertFilter, AlertLevel, ChannelKind, DispatchReport, NewAlert};
pub use service::AlertService;
