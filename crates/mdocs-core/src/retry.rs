//! Retry with exponential backoff for categorized, transient failures.
//!
//! [`with_retry`] re-invokes an async operation while it fails with an error
//! that is (a) part of the structured error model, (b) flagged retryable and
//! (c) listed in [`RetryConfig::retryable_error_codes`]. Anything else is
//! returned immediately: unrecognized failures are assumed to be permanent.

use crate::error::{Classify, ErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behaviour for document fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Double the delay after every failed attempt.
    pub exponential_backoff: bool,
    /// Codes eligible for retry.
    pub retryable_error_codes: BTreeSet<ErrorCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            exponential_backoff: true,
            retryable_error_codes: [
                ErrorCode::NetworkError,
                ErrorCode::NetworkTimeout,
                ErrorCode::RateLimited,
                ErrorCode::GithubRateLimit,
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// Partial update merged into an existing [`RetryConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigUpdate {
    /// New attempt bound.
    pub max_attempts: Option<u32>,
    /// New base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// New delay cap in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// New backoff mode.
    pub exponential_backoff: Option<bool>,
    /// Replacement set of retryable codes.
    pub retryable_error_codes: Option<BTreeSet<ErrorCode>>,
}

impl RetryConfig {
    /// Apply every field present in `update`.
    pub fn merge(&mut self, update: RetryConfigUpdate) {
        if let Some(v) = update.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = update.base_delay_ms {
            self.base_delay_ms = v;
        }
        if let Some(v) = update.max_delay_ms {
            self.max_delay_ms = v;
        }
        if let Some(v) = update.exponential_backoff {
            self.exponential_backoff = v;
        }
        if let Some(v) = update.retryable_error_codes {
            self.retryable_error_codes = v;
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// Exponential mode yields `min(base * 2^(attempt-1), max)`; constant mode
    /// always yields `base`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return Duration::from_millis(self.base_delay_ms);
        }
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Whether `err` passes every retry gate.
    pub fn is_retryable<E: Classify>(&self, err: &E) -> bool {
        err.docs_error().is_some_and(|e| {
            e.is_retryable() && self.retryable_error_codes.contains(&e.code())
        })
    }
}

/// Run `operation`, retrying transient failures according to `config`.
///
/// Only the error from the final attempt is returned on exhaustion.
pub async fn with_retry<T, E, F, Fut>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !config.is_retryable(&err) {
                    if attempt > 1 {
                        warn!(attempt, "giving up after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }

                let delay = config.delay_for(attempt);
                debug!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after transient failure: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!(config.exponential_backoff);
        assert_eq!(config.retryable_error_codes.len(), 4);
        assert!(config.retryable_error_codes.contains(&ErrorCode::GithubRateLimit));
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for(4), Duration::from_millis(8000));
        assert_eq!(config.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(config.delay_for(80), Duration::from_millis(10_000));
    }

    #[test]
    fn test_constant_delay() {
        let config = RetryConfig {
            exponential_backoff: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for(1), config.delay_for(6));
    }

    #[test]
    fn test_merge_only_touches_present_fields() {
        let mut config = RetryConfig::default();
        config.merge(RetryConfigUpdate {
            max_attempts: Some(5),
            ..RetryConfigUpdate::default()
        });
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 1000);
    }

    #[tokio::test]
    async fn test_retry_bound_with_retryable_error() {
        // Given: An operation that always fails with a retryable network error
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        // When: Running it with three attempts
        let result: Result<(), Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::network("connection reset", None)) }
            },
            &fast_config(3),
        )
        .await;

        // Then: Exactly three invocations, then the error surfaces
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().code(), ErrorCode::NetworkError);
    }

    #[tokio::test]
    async fn test_non_retryable_error_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::document_not_found("missing")) }
            },
            &fast_config(10),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().code(), ErrorCode::DocumentNotFound);
    }

    #[tokio::test]
    async fn test_retryable_flag_without_listed_code_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::new(ErrorCode::SearchTimeout, "slow")) }
            },
            &fast_config(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listed_code_without_retryable_flag_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::network("gone", Some(410))) }
            },
            &fast_config(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_foreign_errors_are_never_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), anyhow::Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow::anyhow!("socket closed")) }
            },
            &fast_config(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(
            || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::new(ErrorCode::RateLimited, "429"))
                    } else {
                        Ok("content")
                    }
                }
            },
            &fast_config(3),
        )
        .await;

        assert_eq!(result.unwrap(), "content");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), Error> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::network("x", None)) }
            },
            &fast_config(0),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
