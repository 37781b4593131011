// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect schedule for the feed socket.

use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff: the n-th reconnect attempt waits
/// `base * 2^(n-1)`, and after `max_attempts` failures the client
/// stops retrying until told to connect again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Policy that never retries; the socket closes on the first failure.
    pub fn disabled() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max_attempts: 0,
        }
    }

    /// Wait before reconnect attempt `attempt` (1-based), or `None`
    /// once the attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base.saturating_mul(factor))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
