//! Reconnect backoff
//!
//! Delays grow as `initial_delay * 2^n`, capped at `max_delay`, and are
//! shortened by up to 20% at random so that several bridges restarting
//! together do not hit the broker in lockstep.

use rand::Rng;
use std::time::Duration;

use hestia_core::ReconnectConfig;

/// Largest fraction shaved off a delay
pub const JITTER_FACTOR: f64 = 0.2;

/// Exponential backoff state for one link
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    /// Create from reconnect configuration
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay.max(config.initial_delay),
            max_attempts: config.max_attempts,
            attempts: 0,
        }
    }

    /// Retries handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once `max_attempts` retries have been used (never if 0)
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts != 0 && self.attempts >= self.max_attempts
    }

    /// Delay for retry number `attempt` before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(31);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delay before the next retry; counts the retry
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        let shave = rand::thread_rng().gen_range(0.0..=JITTER_FACTOR);
        base.mul_f64(1.0 - shave)
    }

    /// Forget past failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
