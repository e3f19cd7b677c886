//! Exponential backoff for reopening the feature stream.
use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

/// Tracks consecutive stream failures and computes how long to wait before the next attempt.
///
/// The attempt counter is atomic, so failures reported by the stream task and `reset()` calls
/// from elsewhere never lose updates.
#[derive(Debug)]
pub struct ReconnectPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    attempt: AtomicU32,
}

impl ReconnectPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries,
            initial_delay,
            max_delay,
            attempt: AtomicU32::new(0),
        }
    }

    /// `min(initial_delay * 2^attempt, max_delay)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.delay(self.attempt())
    }

    pub fn should_retry(&self) -> bool {
        self.attempt() < self.max_retries
    }

    /// Count a failed attempt. Returns the number of failures so far.
    pub fn record_failure(&self) -> u32 {
        self.attempt
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    /// Forget previous failures. Called after every successful connection.
    pub fn reset(&self) {
        self.attempt.store(0, Ordering::Release);
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
