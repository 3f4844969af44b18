//! Bounded retry with exponential backoff for external calls
//!
//! Only `RateLimited` and `Timeout` failures are retried. Every attempt and
//! every backoff sleep races the run-level cancellation token, so a cancelled
//! run stops waiting on the network immediately.

use crate::types::{AppError, Result};
use crate::utils::toml_config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry behaviour for one class of external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts (useful for testing)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Backoff before retry number `attempt` (1-based), capped at `max_backoff`, with up to 10% jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_backoff.as_secs_f64() * exp;
        let capped = base.min(self.max_backoff.as_secs_f64());
        if capped <= 0.0 {
            return Duration::ZERO;
        }
        let jitter = rand::rng().random_range(0.0..=capped * 0.1);
        Duration::from_secs_f64((capped + jitter).min(self.max_backoff.as_secs_f64()))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, exhausts
    /// the attempt budget, or `cancel` fires.
    pub async fn run<T, F, Fut>(&self, label: &str, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.drive(label, cancel, true, op).await
    }

    /// Like [`RetryPolicy::run`], except an attempt that has started always
    /// finishes. Once `stop` fires, a failed attempt returns its own error
    /// instead of being retried, and a pending backoff ends early.
    pub async fn run_settled<T, F, Fut>(&self, label: &str, stop: &CancellationToken, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.drive(label, stop, false, op).await
    }

    async fn drive<T, F, Fut>(&self, label: &str, cancel: &CancellationToken, interrupt: bool, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if interrupt && cancel.is_cancelled() {
                return Err(AppError::Cancelled(label.to_string()));
            }

            let outcome = if interrupt {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AppError::Cancelled(label.to_string())),
                    result = op() => result,
                }
            } else {
                op().await
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_attempts {
                if err.is_retryable() {
                    tracing::warn!(call = label, attempts = attempt, error = %err, "Retries exhausted");
                }
                return Err(err);
            }

            let delay = self.backoff_for(attempt);
            tracing::debug!(
                call = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(if interrupt {
                        AppError::Cancelled(label.to_string())
                    } else {
                        err
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::immediate(3);
        let token = CancellationToken::new();

        let counter = calls.clone();
        let result = policy
            .run("test", &token, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::RateLimited("429".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::immediate(2);
        let token = CancellationToken::new();

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("test", &token, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Timeout("slow".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::immediate(5);
        let token = CancellationToken::new();

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("test", &token, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Authentication("401".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let policy = RetryPolicy::default();
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<()> = policy.run("test", &token, || async { Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            multiplier: 1.0,
        };
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<()> = policy
            .run("test", &token, || async { Err(AppError::RateLimited("429".into())) })
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_settled_run_finishes_attempt_after_cancel() {
        let policy = RetryPolicy::immediate(3);
        let token = CancellationToken::new();
        let trigger = token.clone();

        let result = policy
            .run_settled("test", &token, || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Ok("answer")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_settled_run_stops_retrying_once_cancelled() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            multiplier: 1.0,
        };
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = policy
            .run_settled("test", &token, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Timeout("slow".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        };

        assert!(policy.backoff_for(1) >= Duration::from_millis(500));
        assert!(policy.backoff_for(1) <= Duration::from_millis(550));
        assert!(policy.backoff_for(8) <= Duration::from_secs(2));
    }
}
