//! Per-key sliding window of accepted events.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of accepted events for one key, oldest first.
///
/// The limiter reads the clock and appends while holding its lock, so the
/// deque is always chronologically sorted and pruning only ever touches the
/// front.
#[derive(Debug, Clone, Default)]
pub struct EventWindow {
    events: VecDeque<Instant>,
    /// Window length used by the most recent check on this key
    window: Duration,
}

impl EventWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every event that is `window` or more old at `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        self.window = window;
        while let Some(&oldest) = self.events.front() {
            if now.duration_since(oldest) < window {
                break;
            }
            self.events.pop_front();
        }
    }

    /// Record an accepted event.
    pub fn record(&mut self, now: Instant) {
        self.events.push_back(now);
    }

    /// Number of events currently held.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are held.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The oldest event still counted.
    pub fn oldest(&self) -> Option<Instant> {
        self.events.front().copied()
    }

    /// Held events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.events.iter()
    }

    /// Whether every held event has aged out of the last-used window.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.events.back() {
            Some(&newest) => now.duration_since(newest) >= self.window,
            None => true,
        }
    }
}
