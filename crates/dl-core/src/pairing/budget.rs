//! Attempt budget for a single pairing code.
//!
//! A code's expiry is an attempt count, not a wall-clock timeout: slow
//! networks consume fewer attempts per unit of time, never fewer in total.

use super::session::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    attempt: u32,
}

impl RetryBudget {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Charge one attempt against the current code.
    ///
    /// `Initializing` is a grace period and is never charged. Returns whether
    /// an attempt was consumed.
    pub fn record_attempt(&mut self, status: DeviceStatus) -> bool {
        if status == DeviceStatus::Initializing {
            return false;
        }
        self.attempt = (self.attempt + 1).min(self.max_attempts);
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Fresh code: nothing consumed yet.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Replacing the code failed: sit one attempt below exhaustion so the
    /// next charged tick retries the replacement.
    pub fn rearm_after_failed_replacement(&mut self) {
        self.attempt = self.max_attempts - 1;
    }
}
