//! Reconnect backoff
//!
//! Each failure multiplies the previous delay by a fixed factor, clamped at
//! a maximum: `delay = min(previous * factor, max)`. A successful connect
//! resets both the delay and the attempt counter.

use std::time::Duration;

use crate::config::Config;

/// Delay schedule for reconnect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_ms: u64,
    factor: f64,
    max_ms: u64,
    current_ms: u64,
    attempts: u32,
    max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration, max_attempts: Option<u32>) -> Self {
        let initial_ms = initial.as_millis() as u64;
        Self {
            initial_ms,
            factor,
            max_ms: max.as_millis() as u64,
            current_ms: initial_ms,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            config.backoff_factor,
            Duration::from_millis(config.max_backoff_ms),
            config.max_reconnect_attempts,
        )
    }

    /// Delay before the next reconnect attempt.
    ///
    /// Returns `None` once the configured attempt limit is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(limit) = self.max_attempts {
            if self.attempts >= limit {
                return None;
            }
        }

        let scaled = (self.current_ms as f64 * self.factor).floor();
        self.current_ms = if scaled.is_finite() && scaled < self.max_ms as f64 {
            scaled as u64
        } else {
            self.max_ms
        };
        self.attempts += 1;

        Some(Duration::from_millis(self.current_ms))
    }

    /// Back to the initial delay, e.g. after a successful connect
    pub fn reset(&mut self) {
        self.current_ms = self.initial_ms;
        self.attempts = 0;
    }

    /// Attempts scheduled since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_attempts, Some(limit) if self.attempts >= limit)
    }
}
