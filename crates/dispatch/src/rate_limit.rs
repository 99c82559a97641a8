//! Global sliding-window dispatch limit

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Width of the rolling rate-limit window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Counts dispatches issued within the last [`RATE_WINDOW`]
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_per_window: usize,
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_per_window: usize) -> Self {
        Self {
            enabled,
            max_per_window,
            window: RATE_WINDOW,
            stamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        // Stamps from different workers may arrive slightly out of order
        self.stamps
            .retain(|stamp| now.saturating_duration_since(*stamp) < window);
    }

    /// Whether one more dispatch fits in the window
    pub fn has_capacity(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }
        self.prune(now);
        self.stamps.len() < self.max_per_window
    }

    /// Count a dispatch. No-op when disabled.
    pub fn record(&mut self, now: Instant) {
        if self.enabled {
            self.stamps.push_back(now);
        }
    }

    /// Check and record in one step
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.has_capacity(now) {
            self.record(now);
            true
        } else {
            false
        }
    }

    /// Dispatches counted in the current window
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.stamps.len()
    }

    /// Configured ceiling, if limiting is enabled
    pub fn limit(&self) -> Option<usize> {
        self.enabled.then_some(self.max_per_window)
    }
}
