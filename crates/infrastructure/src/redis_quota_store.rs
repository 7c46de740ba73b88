//! Redis-backed quota store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_application::QuotaStore;
use dispatch_core::{AppError, AppResult};
use dispatch_domain::QuotaRecord;
use redis::AsyncCommands;

/// Redis implementation of the quota store port.
///
/// Records are stored as JSON values with a TTL equal to the retention period,
/// so stale keys expire on their own instead of being purged.
#[derive(Clone)]
pub struct RedisQuotaStore {
    client: redis::Client,
    namespace: String,
    retention_seconds: u64,
}

impl RedisQuotaStore {
    /// Creates a store with a configured Redis client, key namespace and TTL.
    #[must_use]
    pub fn new(
        client: redis::Client,
        namespace: impl Into<String>,
        retention_seconds: u64,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            retention_seconds: retention_seconds.max(1),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Store(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn load(&self, key: &str) -> AppResult<Option<QuotaRecord>> {
        let mut connection = self.connection().await?;
        let payload: Option<String> = connection
            .get(self.key_for(key))
            .await
            .map_err(|error| AppError::Store(format!("failed to load redis quota: {error}")))?;

        payload
            .map(|payload| {
                serde_json::from_str::<QuotaRecord>(&payload).map_err(|error| {
                    AppError::Store(format!("failed to decode redis quota: {error}"))
                })
            })
            .transpose()
    }

    async fn save(&self, key: &str, record: &QuotaRecord) -> AppResult<()> {
        let payload = serde_json::to_string(record)
            .map_err(|error| AppError::Store(format!("failed to encode redis quota: {error}")))?;

        let mut connection = self.connection().await?;
        let _: () = connection
            .set_ex(self.key_for(key), payload, self.retention_seconds)
            .await
            .map_err(|error| AppError::Store(format!("failed to save redis quota: {error}")))?;

        Ok(())
    }

    async fn purge_stale(&self, _before: DateTime<Utc>) -> AppResult<u64> {
        // Redis quota keys expire automatically via TTL.
        Ok(0)
    }
}
