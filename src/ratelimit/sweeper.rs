//! Background eviction of idle limiter keys.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Spawn a task that sweeps idle keys out of `limiter` every `interval`.
///
/// The task runs until its handle is aborted.
pub fn spawn_sweeper<C>(limiter: Arc<RateLimiter<C>>, interval: Duration) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    info!(interval_secs = interval.as_secs(), "Starting rate limit key sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            debug!(
                removed_keys = removed,
                tracked_keys = limiter.tracked_keys(),
                "Sweep finished"
            );
        }
    })
}
