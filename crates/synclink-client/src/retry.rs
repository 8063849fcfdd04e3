//! Linear reconnect backoff.
//!
//! Delays ramp linearly from the first to the maximum backoff over the
//! configured number of tries, then the policy is exhausted. A
//! successful handshake resets it to the start of the ramp.

use std::time::Duration;

/// Linear backoff policy for reconnection attempts.
#[derive(Debug, Clone)]
pub struct LinearRetry {
    first: Duration,
    max: Duration,
    max_tries: u32,
    tries: u32,
}

impl LinearRetry {
    /// Creates a policy ramping from `first` to `max` over `max_tries`
    /// attempts.
    pub fn new(first: Duration, max: Duration, max_tries: u32) -> Self {
        Self {
            first,
            max,
            max_tries,
            tries: 0,
        }
    }

    /// Whether another attempt is still within budget.
    pub fn has_next(&self) -> bool {
        self.tries < self.max_tries
    }

    /// Attempts made since the last reset.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Consumes one attempt and returns how long to wait before it.
    /// `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.has_next() {
            return None;
        }
        let delay = self.delay_for(self.tries);
        self.tries += 1;
        Some(delay)
    }

    /// Rewinds the policy to the start of the ramp.
    pub fn reset(&mut self) {
        self.tries = 0;
    }

    fn delay_for(&self, tries: u32) -> Duration {
        if self.max_tries <= 1 {
            return self.first;
        }
        let span = self.max.saturating_sub(self.first);
        let fraction = f64::from(tries) / f64::from(self.max_tries - 1);
        self.first + span.mul_f64(fraction)
    }
}
