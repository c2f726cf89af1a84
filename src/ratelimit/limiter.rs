//! Core rate limiter implementation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::clock::{Clock, MonotonicClock};
use super::decision::Decision;
use super::key::LimitKey;
use super::rules::RateLimitRule;
use super::window::EventWindow;

/// Sliding-window request counter keyed by `(identifier, scope)`.
///
/// One instance is created at startup and shared (behind an `Arc`) by every
/// request handler. A single mutex guards the whole event log, so the
/// prune, count and append steps of a check happen as one indivisible unit
/// and racing callers for the last free slot are resolved by lock order.
pub struct RateLimiter<C: Clock = MonotonicClock> {
    /// Accepted event timestamps indexed by limit key
    events: Mutex<HashMap<LimitKey, EventWindow>>,
    clock: C,
}

impl RateLimiter {
    /// Create a new rate limiter reading the monotonic system clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Decide whether one more event for `identifier` in `scope` may proceed.
    ///
    /// At most `limit` events are accepted in any trailing `window`. Denied
    /// calls leave the log untouched and carry the time until the oldest
    /// counted event leaves the window.
    ///
    /// Inputs are not validated here. A zero `limit` denies everything and a
    /// zero `window` accepts everything; `RateLimitRule` refuses both.
    pub fn check(&self, identifier: &str, scope: &str, limit: u32, window: Duration) -> Decision {
        let key = LimitKey::new(identifier, scope);

        trace!(
            key = %key,
            limit = limit,
            window_secs = window.as_secs_f64(),
            "Checking rate limit"
        );

        let mut events = self.events.lock();
        // Read under the lock so recorded order matches lock order
        let now = self.clock.now();
        let log = events.entry(key.clone()).or_default();

        log.prune(now, window);

        if log.len() >= limit as usize {
            let retry_after = match log.oldest() {
                Some(oldest) => window.saturating_sub(now.duration_since(oldest)),
                None => window,
            };

            debug!(
                key = %key,
                counted = log.len(),
                retry_after_secs = retry_after.as_secs_f64(),
                "Rate limit exceeded"
            );
            return Decision::deny(retry_after);
        }

        log.record(now);
        Decision::allow()
    }

    /// Check using the scope, limit and window of a registered rule.
    pub fn check_rule(&self, identifier: &str, rule: &RateLimitRule) -> Decision {
        self.check(identifier, rule.scope(), rule.limit(), rule.window())
    }

    /// Forget every tracked event for every key.
    pub fn reset(&self) {
        let mut events = self.events.lock();
        let cleared = events.len();
        events.clear();

        info!(cleared_keys = cleared, "Rate limiter reset");
    }

    /// Drop keys whose events have all aged out of their window.
    ///
    /// Keys are otherwise only pruned lazily when checked again, so callers
    /// that stop sending requests would keep their entry forever.
    /// Returns the number of keys removed.
    pub fn sweep(&self) -> usize {
        let mut events = self.events.lock();
        let now = self.clock.now();

        let before = events.len();
        events.retain(|_, log| !log.is_stale(now));
        let removed = before - events.len();

        if removed > 0 {
            info!(
                removed_keys = removed,
                remaining_keys = events.len(),
                "Swept idle rate limit keys"
            );
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.events.lock().len()
    }

    /// Number of events held for a key as of its last check.
    pub fn event_count(&self, identifier: &str, scope: &str) -> usize {
        let events = self.events.lock();
        events
            .get(&LimitKey::new(identifier, scope))
            .map_or(0, EventWindow::len)
    }
}
