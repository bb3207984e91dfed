//! Retry policy with exponential backoff and jitter
//!
//! One policy object is shared by every remote call site (audio fetches,
//! storage writes) instead of hand-written retry loops per caller.
//!
//! **Backoff Strategy:**
//! - Delay before retry `n` (1-based): `base_delay_ms * 2^(n-1)`
//! - Capped at `max_delay_ms`
//! - Scaled by a random factor in `[1 - jitter, 1 + jitter]`

use rand::Rng;
use serde::Deserialize;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Errors that may succeed when the same operation is attempted again
pub trait Transient {
    /// True for timeouts, dropped connections and upstream 5xx responses
    fn is_transient(&self) -> bool;
}

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Relative jitter, 0.0 disables randomisation
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based), without jitter
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay to wait before retry number `retry`, with jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// Non-transient errors are returned immediately. The last transient error
    /// is returned once `max_attempts` is exhausted.
    ///
    /// # Arguments
    /// * `operation_name` - Name for logging (e.g., "song upload")
    /// * `operation` - Closure producing a fresh future per attempt
    pub async fn run<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_transient() {
                        return Err(err);
                    }

                    if attempt >= max_attempts {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis(),
                            error = %err,
                            "Operation failed: retry attempts exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        backoff_ms = delay.as_millis(),
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
