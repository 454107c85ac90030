//! Reconnect backoff with cap and full jitter
//!
//! Each failed reconnect attempt doubles the delay ceiling up to the
//! cap; the actual sleep is drawn uniformly from [0, ceiling] so N
//! faulted sessions do not hammer the coordinator in lockstep.

use std::time::Duration;

use rand::RngExt;

/// Backoff tuning for a session's reconnect loop.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

/// Per-session backoff state. Reset after every successful logon.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Deterministic delay ceiling for the current attempt:
    /// `base * 2^attempt`, capped.
    pub fn ceiling(&self) -> Duration {
        let exp = self
            .config
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt));
        exp.min(self.config.cap)
    }

    /// Draw the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling_ms = self.ceiling().as_millis() as u64;
        self.attempt = self.attempt.saturating_add(1);

        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let mut buf = [0u8; 8];
        rand::rng().fill(&mut buf);
        Duration::from_millis(u64::from_le_bytes(buf) % (ceiling_ms + 1))
    }

    /// Forget accumulated failures after a successful handshake.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
