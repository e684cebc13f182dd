//! Retry policies and their cancellable drivers.
//!
//! Two deliberately asymmetric profiles exist side by side:
//! [`BackoffPolicy`] gives up after a bounded number of attempts and is meant
//! for request-level calls against rate-limited APIs, while
//! [`FixedRetryPolicy`] never gives up on its own and is meant for the
//! chunk-transfer loop, where abandoning a half-uploaded session is worse
//! than waiting out flaky connectivity. Only cooperative cancellation stops
//! the fixed profile. Do not unify them.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, UploadError};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay between retries. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay to prevent unbounded growth.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2) to spread out
    /// simultaneous retriers.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt is computed with a checked shift so attempts >= 32
        // saturate instead of overflowing `Duration`.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        let capped = exp_delay.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        // Jitter is limited so the final delay never exceeds `max_delay`.
        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        if jitter_range_ms == 0 {
            return capped;
        }

        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Fixed-interval retry without an attempt bound.
///
/// Terminates only through success, a non-transient error, or the
/// cancellation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRetryPolicy {
    /// Constant delay between attempts.
    pub interval: Duration,
}

impl Default for FixedRetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Execute an async operation under a bounded exponential-backoff policy.
///
/// The `operation` closure receives the current attempt number (0-indexed).
/// Errors whose [`UploadError::is_transient`] returns false propagate
/// immediately; transient errors are retried until `max_retries` is
/// exhausted. The delay sleep races the cancellation token.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=policy.max_retries {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(UploadError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    // Unreachable: the final iteration returns the error above.
    Err(UploadError::protocol("retry loop exited without result"))
}

/// Execute an async operation under the unbounded fixed-interval policy.
///
/// The `operation` closure receives the attempt number (0-indexed, unbounded).
/// Transient errors are retried forever at a constant interval; everything
/// else propagates. The interval sleep races the cancellation token, which is
/// the only bound this driver has.
pub async fn retry_fixed<F, Fut, T>(
    policy: &FixedRetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u64 = 0;
    loop {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                warn!(
                    attempt = attempt + 1,
                    delay_ms = policy.interval.as_millis() as u64,
                    error = %err,
                    "Retrying at fixed interval after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(UploadError::Cancelled);
                    }
                    _ = tokio::time::sleep(policy.interval) => {}
                }
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_respects_max_cap() {
        let policy = BackoffPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: false,
        };
        // attempt 10: 500ms * 2^10 = 512_000ms, should be capped to 5s
        let delay = policy.delay_for_attempt(10);
        assert!(delay <= Duration::from_secs(5));
    }

    #[test]
    fn delay_without_jitter_is_deterministic() {
        let policy = BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_with_jitter_does_not_exceed_max_cap() {
        let policy = BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };

        // Run a few times to sample jitter outcomes.
        for _ in 0..32 {
            let delay = policy.delay_for_attempt(10);
            assert!(delay <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn backoff_succeeds_on_first_attempt() {
        let policy = BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        let token = CancellationToken::new();
        let result = retry_with_backoff(&policy, &token, |_| async { Ok(42u32) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn backoff_fails_immediately_on_terminal_error() {
        let policy = BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(UploadError::quota("daily limit reached")) }
        })
        .await;
        assert!(matches!(result, Err(UploadError::QuotaExceeded { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn backoff_exhausts_then_fails() {
        let policy = BackoffPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(UploadError::network("connection reset")) }
        })
        .await;
        assert!(matches!(result, Err(UploadError::NetworkTransient { .. })));
        // Initial attempt + 2 retries = 3 total
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn backoff_respects_pre_cancelled_token() {
        let policy = BackoffPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(100),
            max_delay: Duration::from_secs(100),
            jitter: false,
        };
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<u32> = retry_with_backoff(&policy, &token, |_| async { Ok(1u32) }).await;
        assert!(matches!(result, Err(UploadError::Cancelled)));
    }

    #[tokio::test]
    async fn fixed_retries_until_success() {
        let policy = FixedRetryPolicy {
            interval: Duration::from_millis(1),
        };
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result = retry_fixed(&policy, &token, |attempt| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 5 {
                    Err(UploadError::network("flaky link"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(attempts.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn fixed_fails_immediately_on_terminal_error() {
        let policy = FixedRetryPolicy {
            interval: Duration::from_millis(1),
        };
        let token = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry_fixed(&policy, &token, |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(UploadError::auth_expired("token revoked")) }
        })
        .await;
        assert!(matches!(result, Err(UploadError::AuthExpired { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_stops_on_cancellation_during_sleep() {
        let policy = FixedRetryPolicy {
            interval: Duration::from_secs(3600),
        };
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let result: Result<u32> = retry_fixed(&policy, &token, |_| async {
            Err(UploadError::network("still down"))
        })
        .await;
        assert!(matches!(result, Err(UploadError::Cancelled)));
    }
}
