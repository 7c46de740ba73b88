use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use dispatch_core::{AppResult, NonEmptyString};
use dispatch_domain::{QuotaRecord, RateLimitDecision, RateLimitPolicy};

use crate::clock::{Clock, SystemClock};

use super::ports::QuotaStore;

/// Quota checker bound to one policy and one store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<RateLimitPolicy>,
    key_guards: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RateLimiter {
    /// Creates a limiter using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn QuotaStore>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: Arc::new(policy),
            key_guards: Arc::default(),
        }
    }

    /// Replaces the clock used to evaluate windows and blocks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the policy this limiter enforces.
    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Spends one point of `identifier`'s quota and reports the decision.
    ///
    /// Creates the record on first use, applies the window reset and block
    /// rules, then persists the result. Empty identifiers are rejected with
    /// `AppError::Validation`; store failures surface as `AppError::Store`.
    pub async fn check(&self, identifier: &str) -> AppResult<RateLimitDecision> {
        let identifier = NonEmptyString::new(identifier)?;
        let key = self.policy.key_for(&identifier);

        let key_guard = self.key_guard(&key);
        let result = {
            let _guard = key_guard.lock().await;
            self.load_consume_save(&key).await
        };
        self.release_key_guard(&key, key_guard);

        result
    }

    /// Returns true when a check for `identifier` is denied.
    pub async fn is_rate_limited(&self, identifier: &str) -> AppResult<bool> {
        Ok(!self.check(identifier).await?.allowed)
    }

    /// Purges records whose window started more than `retention` ago.
    ///
    /// Also drops key guards left behind by checks that were cancelled.
    pub async fn cleanup(&self, retention: TimeDelta) -> AppResult<u64> {
        self.key_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, guard| Arc::strong_count(guard) > 1);

        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.store.purge_stale(cutoff).await
    }

    async fn load_consume_save(&self, key: &str) -> AppResult<RateLimitDecision> {
        let now = self.clock.now();
        let mut record = self
            .store
            .load(key)
            .await?
            .unwrap_or_else(|| QuotaRecord::fresh(&self.policy, now));

        let decision = record.consume(&self.policy, now);
        self.store.save(key, &record).await?;

        debug!(
            key,
            state = record.state(&self.policy, now).as_str(),
            allowed = decision.allowed,
            remaining = decision.remaining,
            "quota checked"
        );

        Ok(decision)
    }

    /// Returns the guard serialising checks on `key`, creating it on first use.
    fn key_guard(&self, key: &str) -> Arc<Mutex<()>> {
        let mut guards = self
            .key_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guards.entry(key.to_owned()).or_default().clone()
    }

    /// Drops the guard for `key` once no other check holds or awaits it.
    fn release_key_guard(&self, key: &str, key_guard: Arc<Mutex<()>>) {
        let mut guards = self
            .key_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(key_guard);
        if guards
            .get(key)
            .is_some_and(|guard| Arc::strong_count(guard) == 1)
        {
            guards.remove(key);
        }
    }

    #[cfg(test)]
    pub(super) fn tracked_key_guards(&self) -> usize {
        self.key_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
