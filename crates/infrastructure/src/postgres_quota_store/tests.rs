use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use dispatch_application::{ManualClock, QuotaStore, RateLimiter};
use dispatch_domain::{QuotaRecord, RateLimitPolicy};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresQuotaStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres quota store tests: {error}");
    }

    Some(pool)
}

fn unique_key(label: &str) -> String {
    format!(
        "test-{label}:{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

#[tokio::test]
async fn missing_key_loads_as_none() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresQuotaStore::new(pool);
    let loaded = store.load(unique_key("missing").as_str()).await;
    assert!(matches!(loaded, Ok(None)));
}

#[tokio::test]
async fn save_upserts_single_row_per_key() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresQuotaStore::new(pool.clone());
    let key = unique_key("upsert");
    let now = Utc::now();
    let blocked = QuotaRecord {
        points: 0,
        last_reset: now,
        blocked_until: Some(now + TimeDelta::seconds(300)),
    };

    assert!(
        store
            .save(key.as_str(), &QuotaRecord { points: 2, blocked_until: None, ..blocked })
            .await
            .is_ok()
    );
    assert!(store.save(key.as_str(), &blocked).await.is_ok());

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM rate_limit_quotas WHERE key = $1")
        .bind(key.as_str())
        .fetch_one(&pool)
        .await;
    assert!(matches!(count, Ok(1)));

    let loaded = store.load(key.as_str()).await;
    assert!(matches!(
        loaded,
        Ok(Some(record)) if record.points == 0 && record.blocked_until.is_some()
    ));
}

#[tokio::test]
async fn purge_removes_rows_older_than_cutoff() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresQuotaStore::new(pool);
    let stale_key = unique_key("stale");
    let recent_key = unique_key("recent");
    let now = Utc::now();

    let stale = QuotaRecord {
        points: 1,
        last_reset: now - TimeDelta::days(3),
        blocked_until: None,
    };
    let recent = QuotaRecord {
        points: 1,
        last_reset: now,
        blocked_until: None,
    };
    assert!(store.save(stale_key.as_str(), &stale).await.is_ok());
    assert!(store.save(recent_key.as_str(), &recent).await.is_ok());

    let purged = store.purge_stale(now - TimeDelta::days(1)).await;
    assert!(matches!(purged, Ok(count) if count >= 1));
    assert!(matches!(store.load(stale_key.as_str()).await, Ok(None)));
    assert!(matches!(store.load(recent_key.as_str()).await, Ok(Some(_))));
}

#[tokio::test]
async fn limiter_persists_block_across_instances() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let policy = RateLimitPolicy::new(unique_key("shared"), 1, 60, 300);
    let first = RateLimiter::new(Arc::new(PostgresQuotaStore::new(pool.clone())), policy.clone())
        .with_clock(clock.clone());
    let second = RateLimiter::new(Arc::new(PostgresQuotaStore::new(pool)), policy)
        .with_clock(clock);

    assert!(matches!(first.check("ip1").await, Ok(decision) if decision.allowed));
    assert!(matches!(second.check("ip1").await, Ok(decision) if !decision.allowed));
    assert!(matches!(
        first.check("ip1").await,
        Ok(decision) if !decision.allowed && decision.reset_seconds == 300
    ));
}
