//! Per-identifier quota records and the check state machine.
//!
//! A record moves `Fresh -> Active -> Exhausted -> Blocked` as checks spend
//! its points and returns to `Fresh` once its window elapses. Transitions
//! happen only when a record is observed by a check; there is no timer.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::rate_limit::{RateLimitDecision, RateLimitPolicy, ceil_seconds};

/// Remaining allowance and cooldown state tracked for one store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Points left in the current window.
    pub points: i64,
    /// When the current window began.
    pub last_reset: DateTime<Utc>,
    /// End of the active block, if one was imposed.
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Observable state of a quota record at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaState {
    /// Full capacity, either new or logically reset.
    Fresh,
    /// Some points spent, some left.
    Active,
    /// No points left and no block imposed yet.
    Exhausted,
    /// Cooldown in effect.
    Blocked,
}

impl QuotaState {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Active => "active",
            Self::Exhausted => "exhausted",
            Self::Blocked => "blocked",
        }
    }
}

impl QuotaRecord {
    /// Creates a record holding the full capacity of `policy`, starting at `now`.
    #[must_use]
    pub fn fresh(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            points: policy.capacity,
            last_reset: now,
            blocked_until: None,
        }
    }

    /// Returns true once the window that started at `last_reset` is over.
    #[must_use]
    pub fn window_elapsed(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_reset) >= policy.window()
    }

    /// Returns true while a block is in effect at `now`.
    #[must_use]
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until
            .is_some_and(|blocked_until| now < blocked_until)
    }

    /// Classifies the record as a check at `now` would see it.
    #[must_use]
    pub fn state(&self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> QuotaState {
        if self.window_elapsed(policy, now) {
            return QuotaState::Fresh;
        }
        if self.is_blocked_at(now) {
            return QuotaState::Blocked;
        }
        if self.points <= 0 {
            return QuotaState::Exhausted;
        }
        if self.points >= policy.capacity {
            return QuotaState::Fresh;
        }

        QuotaState::Active
    }

    /// Applies one check at `now`, mutating the record and returning the decision.
    ///
    /// The window reset runs first and clears any block. A blocked record is
    /// denied without spending points. A record with no points left is blocked
    /// for `block_seconds`; otherwise one point is spent and the check allowed.
    pub fn consume(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> RateLimitDecision {
        if self.window_elapsed(policy, now) {
            *self = Self::fresh(policy, now);
        }

        if let Some(blocked_until) = self.blocked_until.filter(|until| now < *until) {
            return RateLimitDecision::deny(
                policy.capacity,
                ceil_seconds(blocked_until.signed_duration_since(now)),
            );
        }

        if self.points <= 0 {
            self.points = 0;
            self.blocked_until = Some(
                now.checked_add_signed(policy.block())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
            return RateLimitDecision::deny(policy.capacity, policy.block_seconds.max(0));
        }

        self.points -= 1;
        let window_left = policy
            .window()
            .checked_sub(&now.signed_duration_since(self.last_reset))
            .unwrap_or(TimeDelta::MAX);

        RateLimitDecision::allow(policy.capacity, self.points, ceil_seconds(window_left))
    }
}
