use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dispatch_core::AppResult;
use dispatch_domain::QuotaRecord;

/// Storage port for quota records keyed by `"{key_prefix}:{identifier}"`.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Loads the record for `key`, returning `None` when none exists yet.
    ///
    /// A missing record is not an error. Implementations only fail for
    /// infrastructural reasons, reported as `AppError::Store`.
    async fn load(&self, key: &str) -> AppResult<Option<QuotaRecord>>;

    /// Inserts or replaces the record for `key`.
    async fn save(&self, key: &str, record: &QuotaRecord) -> AppResult<()>;

    /// Removes records whose window started before `before`.
    async fn purge_stale(&self, before: DateTime<Utc>) -> AppResult<u64>;
}
