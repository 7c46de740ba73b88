//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_quota_store;
mod postgres_quota_store;
mod redis_quota_store;

pub use in_memory_quota_store::InMemoryQuotaStore;
pub use postgres_quota_store::PostgresQuotaStore;
pub use redis_quota_store::RedisQuotaStore;
