// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff for opening the local store.
//!
//! Replay of pending operations deliberately does not use this: a failed
//! replay is counted on the operation and retried on the next drain pass.
//!
//! # Example
//!
//! ```
//! use opendoor_sync::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, 4);
//!
//! let once = RetryConfig::no_retry();
//! assert_eq!(once.max_retries, 1);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts, including the first
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Opening the store at app start: a locked or busy file usually clears
    /// within a second or two, a missing directory never does.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
        }
    }

    /// Single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
        }
    }

    /// Delay before the attempt following `delay`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_retries.max(1) {
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max = config.max_retries,
                    error = %err,
                    retry_in = ?delay,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, String> = retry("open", &RetryConfig::test(), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, String> = retry("open", &RetryConfig::test(), || {
            let a = attempts_clone.clone();
            async move {
                let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                if count < 3 {
                    Err(format!("database is locked ({})", count))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), String> = retry("open", &RetryConfig::test(), || {
            let a = attempts_clone.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err("unable to open database file".to_string())
            }
        })
        .await;

        assert!(result.unwrap_err().contains("unable to open"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_runs_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let _: Result<(), String> = retry("open", &RetryConfig::no_retry(), || {
            let a = attempts_clone.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig::startup();
        let mut delay = config.initial_delay;
        assert_eq!(delay, Duration::from_millis(100));
        delay = config.next_delay(delay);
        assert_eq!(delay, Duration::from_millis(200));
        for _ in 0..10 {
            delay = config.next_delay(delay);
        }
        assert_eq!(delay, Duration::from_secs(1));
    }
}
