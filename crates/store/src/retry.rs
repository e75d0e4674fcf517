//! Retry with exponential backoff for retryable store errors

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::StoreResult;

/// Backoff policy for concurrency conflicts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    5
}

fn default_max_delay_ms() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), with up to 50% jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.max_delay_ms);
        let jitter = if capped > 1 {
            rand::thread_rng().gen_range(0..=capped / 2)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after concurrency conflict"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry(&RetryPolicy::default(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Conflict("row".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: StoreResult<()> = with_retry(&RetryPolicy::default(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound("x".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let counter = &calls;
        let result: StoreResult<()> = with_retry(&policy, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict("row".into()))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        for attempt in 1..20 {
            let d = policy.delay_for(attempt);
            assert!(d.as_millis() as u64 <= policy.max_delay_ms + policy.max_delay_ms / 2);
        }
    }
}
