//! Outcome of a rate limit check.

use std::time::Duration;

/// The answer to a single `check` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the event may proceed
    pub allowed: bool,
    /// Time until the oldest counted event leaves the window; zero when allowed
    pub retry_after: Duration,
}

impl Decision {
    /// An allowed decision.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    /// A denied decision carrying a retry hint.
    pub fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }

    /// Whether the event may proceed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Retry hint in fractional seconds.
    pub fn retry_after_secs(&self) -> f64 {
        self.retry_after.as_secs_f64()
    }

    /// Value for a `Retry-After` header: whole seconds, rounded up, at least 1.
    pub fn retry_after_header(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}
