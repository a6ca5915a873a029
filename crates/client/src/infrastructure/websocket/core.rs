//! Platform-agnostic core of the reconnection logic.
//!
//! Free of runtime dependencies: the transport owns the timers and asks this
//! state machine whether and when to try again.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// What the policy wants after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// Stop; the attempt budget is spent
    GiveUp { attempts: u32 },
}

/// Fixed-delay retry state shared by the connect supervisor.
///
/// Failures are counted since the last successful open; an open resets the
/// count so failures never accumulate across healthy sessions.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    failures: u32,
    skip_next_delay: bool,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
            skip_next_delay: false,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.config.max_attempts
    }

    /// A connection opened.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.skip_next_delay = false;
    }

    /// A connection attempt failed.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.is_exhausted() {
            return RetryDecision::GiveUp {
                attempts: self.failures,
            };
        }
        RetryDecision::RetryAfter(self.next_delay())
    }

    /// The server asked us to rotate connections; the next attempt goes out immediately.
    pub fn record_going_away(&mut self) {
        self.skip_next_delay = true;
    }

    /// Delay before the next reconnect attempt, consuming a pending go-away bypass.
    pub fn next_delay(&mut self) -> Duration {
        if std::mem::take(&mut self.skip_next_delay) {
            Duration::ZERO
        } else {
            self.config.delay
        }
    }
}
