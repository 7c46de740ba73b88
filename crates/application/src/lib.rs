//! Application services and ports.

#![forbid(unsafe_code)]

mod clock;
mod rate_limiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limiter::{QuotaStore, RateLimiter};
