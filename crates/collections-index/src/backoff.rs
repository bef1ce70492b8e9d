//! Bounded exponential backoff for retried close (§4.A).
//!
//! A pure value with no shared state: each call to [`Backoff::next_delay`]
//! advances an internal attempt counter and returns the delay to wait before
//! the next retry, or [`IndexError::ExhaustedRetries`] once `max_attempts`
//! delays have already been issued.

use std::time::Duration;

use rand::Rng;

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    jitter_max_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(100, 100, 3)
    }
}

impl Backoff {
    pub fn new(base_ms: u64, jitter_max_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            jitter_max_ms,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay `(base·2^k) + rand[0, jitter_max]` for attempt `k`, or
    /// `ExhaustedRetries` once `max_attempts` delays have been yielded.
    pub fn next_delay(&mut self) -> Result<Duration> {
        if self.attempt >= self.max_attempts {
            return Err(IndexError::ExhaustedRetries);
        }

        let exponential = self.base_ms.saturating_mul(1u64 << self.attempt);
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_max_ms)
        };
        self.attempt += 1;

        Ok(Duration::from_millis(exponential + jitter))
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_max_attempts_delays_then_exhausts() {
        let mut backoff = Backoff::new(100, 100, 3);
        assert!(backoff.next_delay().is_ok());
        assert!(backoff.next_delay().is_ok());
        assert!(backoff.next_delay().is_ok());
        assert!(matches!(
            backoff.next_delay(),
            Err(IndexError::ExhaustedRetries)
        ));
    }

    #[test]
    fn delays_grow_exponentially_within_jitter_bound() {
        let mut backoff = Backoff::new(100, 100, 3);
        let d0 = backoff.next_delay().unwrap();
        let d1 = backoff.next_delay().unwrap();
        let d2 = backoff.next_delay().unwrap();

        assert!(d0.as_millis() >= 100 && d0.as_millis() <= 200);
        assert!(d1.as_millis() >= 200 && d1.as_millis() <= 300);
        assert!(d2.as_millis() >= 400 && d2.as_millis() <= 500);
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let mut backoff = Backoff::new(100, 0, 1);
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_millis(100));
    }
}
