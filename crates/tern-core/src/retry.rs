//! Bounded retry policy for ledger lock acquisition.
//!
//! Lock acquisition is the only operation the engine retries. The policy is
//! a plain value passed to [`crate::history::SchemaHistory::lock`].

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of waits logged at debug level before switching to error level.
const QUIET_WAIT_LIMIT: u32 = 50;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay every time
    #[default]
    Fixed,
    /// Delay multiplied on every attempt, capped at the maximum
    Exponential,
}

/// How long and how often to retry a contended lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Backoff,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed,
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Exponentially growing delay between attempts.
    pub fn exponential(
        max_retries: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// budget is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let delay = match self.backoff {
            Backoff::Fixed => self.initial_delay,
            Backoff::Exponential => {
                let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
                let millis = self.initial_delay.as_millis() as f64 * factor;
                let capped = millis.min(self.max_delay.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        };
        Some(delay)
    }

    /// Call `try_acquire` until it reports success, sleeping between attempts.
    ///
    /// Returns the number of attempts made. Fails with
    /// [`CoreError::LockTimeout`] once retries are exhausted; errors from
    /// `try_acquire` abort immediately.
    pub fn acquire<F>(&self, resource: &str, mut try_acquire: F) -> CoreResult<u32>
    where
        F: FnMut() -> CoreResult<bool>,
    {
        let mut attempt: u32 = 0;
        loop {
            if try_acquire()? {
                return Ok(attempt + 1);
            }
            attempt += 1;
            match self.delay_for_attempt(attempt) {
                Some(delay) => {
                    if attempt <= QUIET_WAIT_LIMIT {
                        log::debug!("Waiting for lock on {resource} (retry {attempt})");
                    } else {
                        log::error!("Still waiting for lock on {resource} (retry {attempt})");
                    }
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                None => {
                    log::error!("Giving up on lock for {resource} after {attempt} attempts");
                    return Err(CoreError::LockTimeout {
                        table: resource.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
