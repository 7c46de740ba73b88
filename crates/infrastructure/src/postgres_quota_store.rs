//! PostgreSQL-backed quota store using the `rate_limit_quotas` table.
//!
//! Each check costs one `SELECT` and one upsert. The read-modify-write cycle is
//! not atomic across processes: two servers checking the same key at the same
//! moment can both spend the same point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_application::QuotaStore;
use dispatch_core::{AppError, AppResult};
use dispatch_domain::QuotaRecord;
use sqlx::PgPool;
use tracing::debug;

#[cfg(test)]
mod tests;

/// PostgreSQL implementation of the quota store port.
#[derive(Clone)]
pub struct PostgresQuotaStore {
    pool: PgPool,
}

impl PostgresQuotaStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for PostgresQuotaStore {
    async fn load(&self, key: &str) -> AppResult<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, QuotaRow>(
            r#"
            SELECT points, last_reset, blocked_until
            FROM rate_limit_quotas
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Store(format!("failed to load quota record: {error}")))?;

        Ok(row.map(QuotaRecord::from))
    }

    async fn save(&self, key: &str, record: &QuotaRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_quotas (key, points, last_reset, blocked_until, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (key) DO UPDATE
            SET
                points = EXCLUDED.points,
                last_reset = EXCLUDED.last_reset,
                blocked_until = EXCLUDED.blocked_until,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(record.points)
        .bind(record.last_reset)
        .bind(record.blocked_until)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Store(format!("failed to save quota record: {error}")))?;

        Ok(())
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM rate_limit_quotas
            WHERE last_reset < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Store(format!("failed to purge stale quotas: {error}")))?;

        debug!(purged = result.rows_affected(), %before, "purged stale quota rows");
        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct QuotaRow {
    points: i64,
    last_reset: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
}

impl From<QuotaRow> for QuotaRecord {
    fn from(row: QuotaRow) -> Self {
        Self {
            points: row.points,
            last_reset: row.last_reset,
            blocked_until: row.blocked_until,
        }
    }
}
