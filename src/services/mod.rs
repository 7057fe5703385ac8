/// Business logic services layer: the alert fanout pipeline
mod cancel;
mod device_resolver;
mod dispatcher;
mod fanout;
mod geo_filter;
mod payload_builder;
mod rate_limiter;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use device_resolver::DeviceResolver;
pub use dispatcher::{
    DispatchBatch, DispatchReport, Dispatcher, ProviderReceipt, PushProvider,
};
pub use fanout::FanoutOrchestrator;
pub use geo_filter::find_nearby;
pub use payload_builder::{NotificationPayload, PayloadBuilder};
pub use rate_limiter::{RateLimitOutcome, RateLimiter};
