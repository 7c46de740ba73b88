//! Request quota ports and the rate limiter service.
//!
//! Each check performs exactly one store read and one store write. Checks on
//! the same key made through one limiter are serialised in-process, while
//! different keys proceed independently. Checks from different processes
//! sharing a persistent store are not serialised, so concurrent callers may be
//! admitted slightly beyond capacity within one window.

mod ports;
mod service;


pub use ports::QuotaStore;
pub use service::RateLimiter;
