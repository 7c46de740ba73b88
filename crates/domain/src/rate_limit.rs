//! Rate limit policies and the decisions produced for each check.

use chrono::TimeDelta;
use dispatch_core::NonEmptyString;
use serde::{Deserialize, Serialize};

/// Quota configuration shared by every identifier checked under one limiter.
///
/// Values are not validated: a policy with `capacity <= 0` denies every
/// request, which is a legitimate if degenerate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    /// Maximum points available per window.
    #[serde(rename = "points")]
    pub capacity: i64,
    /// Window length in seconds after which spent points are restored.
    #[serde(rename = "duration")]
    pub window_seconds: i64,
    /// Cooldown in seconds imposed once the points are exhausted.
    #[serde(rename = "blockDuration")]
    pub block_seconds: i64,
    /// Namespace separating identifiers of different limiters sharing a store.
    pub key_prefix: String,
}

impl RateLimitPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(
        key_prefix: impl Into<String>,
        capacity: i64,
        window_seconds: i64,
        block_seconds: i64,
    ) -> Self {
        Self {
            capacity,
            window_seconds,
            block_seconds,
            key_prefix: key_prefix.into(),
        }
    }

    /// Returns the store key for an identifier: `"{key_prefix}:{identifier}"`.
    #[must_use]
    pub fn key_for(&self, identifier: &NonEmptyString) -> String {
        format!("{}:{}", self.key_prefix, identifier.as_str())
    }

    pub(crate) fn window(&self) -> TimeDelta {
        seconds_delta(self.window_seconds)
    }

    pub(crate) fn block(&self) -> TimeDelta {
        seconds_delta(self.block_seconds.max(0))
    }
}

/// Outcome of a single quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    #[serde(rename = "success")]
    pub allowed: bool,
    /// Configured capacity of the window.
    pub limit: i64,
    /// Points left after this check.
    pub remaining: i64,
    /// Seconds until the window resets (allow) or the block lifts (deny).
    #[serde(rename = "reset")]
    pub reset_seconds: i64,
}

impl RateLimitDecision {
    pub(crate) fn allow(limit: i64, remaining: i64, reset_seconds: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_seconds,
        }
    }

    pub(crate) fn deny(limit: i64, reset_seconds: i64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_seconds,
        }
    }
}

/// Rounds a span up to whole seconds, never below zero.
///
/// Any sub-second remainder counts as a full second, down to the nanosecond.
pub(crate) fn ceil_seconds(span: TimeDelta) -> i64 {
    if span <= TimeDelta::zero() {
        return 0;
    }

    let whole = span.num_seconds();
    match TimeDelta::try_seconds(whole) {
        Some(truncated) if span > truncated => whole.saturating_add(1),
        _ => whole,
    }
}

fn seconds_delta(seconds: i64) -> TimeDelta {
    TimeDelta::try_seconds(seconds).unwrap_or(if seconds < 0 {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    })
}
