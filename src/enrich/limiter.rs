// src/enrich/limiter.rs

//! Process-wide token bucket for detail requests.
//!
//! A caller that finds the bucket empty reserves the next token (the balance
//! goes negative) and sleeps until it is due, so waiters are served in
//! arrival order and `N` acquisitions past the burst take at least
//! `(N - burst) / rate`. A cancelled waiter hands its reservation back.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitSettings;
use crate::errors::{Result, WatchError};

/// Upper bound on a single reservation's wait.
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    per_second: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A full bucket holding `burst` tokens, refilled at `per_second`.
    pub fn new(settings: RateLimitSettings) -> Self {
        let burst = f64::from(settings.burst.max(1));
        Self {
            per_second: settings.per_second,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                updated: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting if needed.
    ///
    /// Fails with `Cancelled` as soon as `cancel` fires; the token is not
    /// consumed in that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled);
        }

        let Some(due) = self.reserve() else {
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release();
                Err(WatchError::Cancelled)
            }
            _ = sleep_until(due) => Ok(()),
        }
    }

    /// Take a token without waiting; `false` if none is available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserve a token; returns when it becomes usable, or `None` if it is
    /// usable right away.
    fn reserve(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);

        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            return None;
        }
        let wait = Duration::try_from_secs_f64(-bucket.tokens / self.per_second)
            .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));
        Some(now + wait)
    }

    fn release(&self) {
        let mut bucket = self.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.burst);
        bucket.updated = now;
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
