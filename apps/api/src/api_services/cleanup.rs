use std::time::Duration;

use chrono::TimeDelta;
use dispatch_application::RateLimiter;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Periodically purges quota records whose window started before the retention period.
///
/// Returns `None` when `interval_seconds` is zero. The purge covers every key in
/// the limiter's store, not only the limiter's own prefix.
pub fn spawn_quota_cleanup(
    rate_limiter: RateLimiter,
    interval_seconds: u64,
    retention_hours: i64,
) -> Option<JoinHandle<()>> {
    if interval_seconds == 0 {
        return None;
    }

    let retention = TimeDelta::try_hours(retention_hours).unwrap_or(TimeDelta::MAX);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match rate_limiter.cleanup(retention).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged stale rate limit records"),
                Err(error) => warn!(error = %error, "failed to purge stale rate limit records"),
            }
        }
    }))
}
