//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod quota;
mod rate_limit;

pub use quota::{QuotaRecord, QuotaState};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy};
