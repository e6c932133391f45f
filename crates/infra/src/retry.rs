//! Bounded retry of whole ledger transactions on transient store failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LedgerResult;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy for ledger transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included (1 = no retries).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(50), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Run `attempt_fn` until it succeeds, fails with a non-transient error, or
/// the policy is exhausted. Each call must open (and own) its transaction so
/// that a failed attempt leaves nothing behind.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt_fn: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient store failure, retrying transaction"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LedgerError, StoreError};
    use bookstock_core::DomainError;
    use std::cell::Cell;

    #[test]
    fn exponential_delay_doubles_and_is_capped() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(50), Duration::from_millis(150));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(150));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(150));
    }

    #[test]
    fn linear_and_fixed_delays() {
        let linear = RetryPolicy::linear(5, Duration::from_millis(10), Duration::from_secs(1));
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(30));

        let fixed = RetryPolicy::fixed(5, Duration::from_millis(10));
        assert_eq!(fixed.delay_for_attempt(4), Duration::from_millis(10));
    }

    #[test]
    fn default_policy_allows_three_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let calls = Cell::new(0);
        let result = run_with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(LedgerError::Store(StoreError::Conflict("40001".into())))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_the_last_error() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let calls = Cell::new(0);
        let result: LedgerResult<()> = run_with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            async { Err(LedgerError::Store(StoreError::Unavailable("down".into()))) }
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Store(StoreError::Unavailable(_)))));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Cell::new(0);
        let result: LedgerResult<()> = run_with_retry(&policy, "test", || {
            calls.set(calls.get() + 1);
            async { Err(LedgerError::Domain(DomainError::insufficient(5, 6))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
