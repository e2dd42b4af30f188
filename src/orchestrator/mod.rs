pub mod audit;
pub mod dispatch;
pub mod lifecycle;
pub mod ratelimit;
pub mod usage;

pub use audit::AuditLog;
pub use dispatch::{decide, DispatchConfig, DispatchMode};
pub use lifecycle::DocumentLifecycle;
pub use ratelimit::{Admission, RateLimiter};
pub use usage::{TerminalOutcome, UsageAggregator, UsageRollup};
