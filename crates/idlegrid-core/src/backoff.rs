//! Reconnect backoff for control-plane connections.
//!
//! Delays start at the initial delay and double after every consecutive
//! failure, capped at the maximum. A success resets the sequence. With a
//! non-zero attempt limit the sequence ends once that many consecutive
//! failures have been recorded.

use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    /// 0 means unlimited.
    max_attempts: u32,
    /// Consecutive failures since the last success.
    failures: u32,
    /// Delay handed out for the next failure.
    current_delay: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            failures: 0,
            current_delay: initial_delay.min(max_delay),
        }
    }

    /// Record a failed attempt and return how long to wait before the next
    /// one, or `None` if the attempt limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        if self.max_attempts != 0 && self.failures >= self.max_attempts {
            warn!(
                failures = self.failures,
                max_attempts = self.max_attempts,
                "reconnect attempts exhausted"
            );
            return None;
        }

        let delay = self.current_delay;
        self.current_delay = self.current_delay.saturating_mul(2).min(self.max_delay);
        debug!(failures = self.failures, delay = ?delay, "backing off before reconnect");
        Some(delay)
    }

    /// Record a success: the next failure starts again from the initial delay.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current_delay = self.initial_delay.min(self.max_delay);
    }

    /// Consecutive failures recorded since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }
}
