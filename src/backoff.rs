//! Reconnect backoff policy.

use std::time::Duration;

/// Exponential backoff between reconnect attempts: 2, 4, 8, 16, then a 30s
/// cap. Reset after a successful registration so a stable connection that
/// drops hours later retries quickly again.
#[derive(Debug)]
pub struct Backoff {
    current: u64,
}

impl Backoff {
    const FLOOR_SECS: u64 = 2;
    const CAP_SECS: u64 = 30;

    pub fn new() -> Self {
        Self {
            current: Self::FLOOR_SECS,
        }
    }

    /// Delay to sleep before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.current);
        self.current = (self.current * 2).min(Self::CAP_SECS);
        delay
    }

    pub fn reset(&mut self) {
        self.current = Self::FLOOR_SECS;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
