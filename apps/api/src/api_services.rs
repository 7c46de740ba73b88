mod cleanup;
mod database;
mod redis;
mod state_builder;

pub use cleanup::spawn_quota_cleanup;
pub use database::connect_and_migrate;
pub use redis::build_redis_client;
pub use state_builder::build_app_state;
