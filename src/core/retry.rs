//! Reconnect backoff for upstream connections.

use std::time::Duration;

/// Backoff configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// First delay after a failure
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive failures
    pub multiplier: f64,
    /// Add up to 10% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Exponential backoff state for one connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        let current = config.initial_backoff;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let base = self.current;

        let grown = Duration::from_millis((self.current.as_millis() as f64 * self.config.multiplier) as u64);
        self.current = grown.min(self.config.max_backoff);

        if self.config.jitter {
            let jitter_ms = rand::random::<f64>() * base.as_millis() as f64 * 0.1;
            base + Duration::from_millis(jitter_ms as u64)
        } else {
            base
        }
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.config.initial_backoff;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
