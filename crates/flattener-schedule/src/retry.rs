//! Retry & Backoff wrapper: wraps a single provider call
//! with rate-limiter acquisition, exponential backoff with jitter, and
//! cancellation awareness.

use crate::token_bucket::TokenBucket;
use flattener_common::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.10,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = self.multiplier.powi((attempt - 1) as i32);
        let raw = self.base_delay.as_secs_f64() * exponent;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter_span = capped * self.jitter_fraction;
        let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}

/// Run `call` under the retry/backoff policy, serialized behind
/// `bucket`'s rate limiter. Permanent errors fail immediately; rate-limit
/// and transient errors retry up to `policy.max_attempts`; cancellation
/// aborts pending waits and sleeps.
pub async fn with_retry<T, F, Fut>(
    bucket: &TokenBucket,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = bucket.acquire() => {}
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, "retrying after recoverable provider error: {err}");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
