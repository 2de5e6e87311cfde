//! Bounded retry with exponential backoff for remote cycle steps.

use auto_trade_core::config::EngineConfig;
use auto_trade_core::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Retry parameters for one remote call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub step_timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            max_attempts: engine.max_retries.max(1),
            base_delay: Duration::from_millis(engine.backoff_base_ms),
            max_delay: Duration::from_millis(engine.backoff_cap_ms),
            step_timeout: Duration::from_secs(engine.step_timeout_secs),
        }
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

/// Runs `op` under the step timeout, retrying transient failures with
/// exponential backoff until the attempt budget runs out or `stop` is
/// raised. Non-transient failures return immediately.
///
/// # Errors
///
/// Returns the final `ApiError` once attempts are exhausted, the stop
/// signal is set, or a non-transient failure occurs.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    stop: &watch::Receiver<bool>,
    step: &str,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(policy.step_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(policy.step_timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    %step,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;

                // Abandon remaining attempts when a stop was requested
                // during the backoff; the caller persists a FAILED record.
                if *stop.borrow() {
                    return Err(err);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            step_timeout: Duration::from_secs(1),
        }
    }

    fn no_stop() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy(5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40), "capped");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_backoff(policy(3), &no_stop(), "fetch", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::Unavailable("503".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_on_persistent_transient_failure() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = with_backoff(policy(3), &no_stop(), "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::RateLimited("429".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "bounded attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = with_backoff(policy(3), &no_stop(), "order", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Rejected("insufficient funds".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry on rejection");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_abandons_remaining_attempts() {
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = with_backoff(policy(5), &stop_rx, "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Unavailable("503".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "stopped after first attempt");
    }
}
