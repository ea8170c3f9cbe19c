use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::LimiterConfig;
use crate::error::{HarnessError, Result};

const MICROS_PER_SECOND: u128 = 1_000_000;

/// Token bucket state using integer-only math. One token is
/// `MICROS_PER_SECOND` units so refill stays exact at microsecond resolution.
#[derive(Debug)]
struct Bucket {
    /// Target rate in tokens per second
    rate: u64,
    /// Maximum tokens that can accumulate
    capacity: u64,
    /// Current token count (scaled)
    tokens: u128,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate: u64, capacity: u64) -> Self {
        Self {
            rate,
            capacity,
            tokens: (capacity as u128) * MICROS_PER_SECOND,
            last_refill: Instant::now(),
        }
    }

    /// Continuous refill based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_micros = now.duration_since(self.last_refill).as_micros();
        if elapsed_micros == 0 {
            return;
        }

        let tokens_to_add = (self.rate as u128) * elapsed_micros;
        let max_tokens = (self.capacity as u128) * MICROS_PER_SECOND;
        self.tokens = self.tokens.saturating_add(tokens_to_add).min(max_tokens);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= MICROS_PER_SECOND {
            self.tokens -= MICROS_PER_SECOND;
            true
        } else {
            false
        }
    }

    /// Time until the next token is banked.
    fn time_to_next(&self) -> Duration {
        if self.rate == 0 {
            return Duration::from_secs(1);
        }
        let deficit = MICROS_PER_SECOND.saturating_sub(self.tokens);
        let wait_micros = (deficit / self.rate as u128).max(1);
        Duration::from_micros(wait_micros as u64)
    }
}

/// Token-bucket admission gate shared between tasks.
///
/// `allow` is the non-blocking check used by the server ingress path;
/// `wait` suspends a worker until a token is available or the supplied
/// token is cancelled.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn with_capacity(rate: u64, capacity: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket::new(rate, capacity)),
        }
    }

    pub fn from_config(config: LimiterConfig) -> Self {
        Self::with_capacity(config.rate, config.burst)
    }

    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume a token if one is immediately available.
    pub fn allow(&self) -> bool {
        self.bucket().try_acquire()
    }

    /// Wait until a token is available and consume it.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(HarnessError::RateLimiterCanceled);
            }

            let delay = {
                let mut bucket = self.bucket();
                if bucket.try_acquire() {
                    return Ok(());
                }
                bucket.time_to_next()
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(HarnessError::RateLimiterCanceled),
                _ = sleep(delay) => {}
            }
        }
    }
}
