//! Retry on conflict with exponential backoff and jitter.
//!
//! Only callers that know an error is transient should retry. The predicate
//! passed to [`with_retry_if`] decides that, so the loop itself knows nothing
//! about any particular storage backend's conflict codes.
//!
//! # Example
//!
//! ```rust,no_run
//! use cms_core::retry::{with_retry_if, RetryConfig};
//!
//! #[derive(Debug)]
//! enum TxError {
//!     Conflict,
//!     Fatal,
//! }
//!
//! async fn example() -> Result<(), TxError> {
//!     with_retry_if(
//!         &RetryConfig::conflict(),
//!         || async { Err(TxError::Conflict) },
//!         |err| matches!(err, TxError::Conflict),
//!     )
//!     .await
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Backoff policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Growth factor between delays
    pub exponential_base: f64,

    /// Random extra delay as a fraction of the base delay, `0.0..=1.0`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Policy for serialization conflicts: short, jittered, bounded.
    pub fn conflict() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            exponential_base: 2.0,
            jitter: 0.5,
        }
    }

    /// Never retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
            jitter: 0.0,
        }
    }

    /// Override the attempt bound.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after a failed attempt whose base delay was `base`.
    fn jittered(&self, base: Duration) -> Duration {
        let fraction = self.jitter.clamp(0.0, 1.0);
        if fraction == 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=fraction);
        base.mul_f64(1.0 + extra).min(self.max_delay)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `f` until it succeeds, fails with an error `is_retryable` rejects, or
/// the attempt bound is reached. The last error is returned.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut f: F,
    mut is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => {
                tracing::debug!(error = ?e, "Error is not retryable, returning immediately");
                return Err(e);
            }
            Err(e) if attempt >= config.max_attempts => {
                tracing::error!(attempts = attempt, error = ?e, "All retry attempts exhausted");
                return Err(e);
            }
            Err(e) => {
                let wait = config.jittered(delay);
                tracing::warn!(
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    error = ?e,
                    "Attempt failed, retrying"
                );

                sleep(wait).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_presets() {
        let conflict = RetryConfig::conflict();
        assert_eq!(conflict.max_attempts, 5);
        assert!(conflict.jitter > 0.0);

        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
        assert_eq!(RetryConfig::default().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            jitter: 0.5,
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        };
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let wait = config.jittered(base);
            assert!(wait >= base);
            assert!(wait <= Duration::from_millis(151));
        }

        let capped = config.jittered(Duration::from_secs(1));
        assert_eq!(capped, Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(300),
            ..RetryConfig::default()
        };
        let second = config.next_delay(Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(config.next_delay(second), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry_if(
            &RetryConfig::conflict(),
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err("conflict")
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let config = RetryConfig::conflict().with_max_attempts(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry_if(
            &config,
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("always conflicts")
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("always conflicts"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry_if(
            &RetryConfig::conflict(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent failure")
                }
            },
            |_| false,
        )
        .await;

        assert_eq!(result, Err("permanent failure"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
