use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_application::QuotaStore;
use dispatch_core::AppResult;
use dispatch_domain::QuotaRecord;
use tokio::sync::RwLock;

/// Process-local quota store.
///
/// Records are lost on restart and are not shared between server instances.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    records: RwLock<HashMap<String, QuotaRecord>>,
}

impl InMemoryQuotaStore {
    /// Creates an empty in-memory quota store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked keys.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true when no key is tracked.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn load(&self, key: &str) -> AppResult<Option<QuotaRecord>> {
        Ok(self.records.read().await.get(key).copied())
    }

    async fn save(&self, key: &str, record: &QuotaRecord) -> AppResult<()> {
        self.records
            .write()
            .await
            .insert(key.to_owned(), *record);
        Ok(())
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let initial = records.len();
        records.retain(|_, record| record.last_reset >= before);

        Ok(u64::try_from(initial - records.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeDelta, Utc};
    use dispatch_application::{ManualClock, QuotaStore, RateLimiter};
    use dispatch_domain::{QuotaRecord, RateLimitPolicy};

    use super::InMemoryQuotaStore;

    #[tokio::test]
    async fn missing_key_loads_as_none() {
        let store = InMemoryQuotaStore::new();
        assert!(matches!(store.load("api:10.0.0.1").await, Ok(None)));
    }

    #[tokio::test]
    async fn save_replaces_existing_record() {
        let store = InMemoryQuotaStore::new();
        let now = Utc::now();
        let first = QuotaRecord {
            points: 3,
            last_reset: now,
            blocked_until: None,
        };
        let second = QuotaRecord {
            points: 1,
            ..first
        };

        assert!(store.save("api:10.0.0.1", &first).await.is_ok());
        assert!(store.save("api:10.0.0.1", &second).await.is_ok());

        assert_eq!(store.len().await, 1);
        assert!(matches!(
            store.load("api:10.0.0.1").await,
            Ok(Some(record)) if record.points == 1
        ));
    }

    #[tokio::test]
    async fn purge_removes_only_records_older_than_cutoff() {
        let store = InMemoryQuotaStore::new();
        let now = Utc::now();
        let stale = QuotaRecord {
            points: 0,
            last_reset: now - TimeDelta::hours(48),
            blocked_until: None,
        };
        let recent = QuotaRecord {
            points: 4,
            last_reset: now,
            blocked_until: None,
        };
        assert!(store.save("api:stale", &stale).await.is_ok());
        assert!(store.save("api:recent", &recent).await.is_ok());

        let purged = store.purge_stale(now - TimeDelta::hours(24)).await;
        assert!(matches!(purged, Ok(1)));
        assert!(matches!(store.load("api:stale").await, Ok(None)));
        assert!(matches!(store.load("api:recent").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn limiter_over_in_memory_store_follows_block_and_reset() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(store.clone(), RateLimitPolicy::new("api", 3, 60, 300))
            .with_clock(clock.clone());

        let mut remaining = Vec::new();
        for _ in 0..4 {
            match limiter.check("ip1").await {
                Ok(decision) => remaining.push((decision.allowed, decision.remaining)),
                Err(error) => panic!("check failed: {error}"),
            }
        }
        assert_eq!(
            remaining,
            vec![(true, 2), (true, 1), (true, 0), (false, 0)]
        );

        clock.advance(TimeDelta::seconds(301));
        assert!(matches!(
            limiter.check("ip1").await,
            Ok(decision) if decision.allowed && decision.remaining == 2
        ));
        assert!(!store.is_empty().await);
    }
}
