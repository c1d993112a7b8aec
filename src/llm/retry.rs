// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry logic for LLM API calls with exponential backoff

use crate::config::settings::ResilienceConfig;
use crate::error::{ApiError, ChatError, Result};
use crate::network::Connectivity;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy shared read-only by every send
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (doubled for each later one)
    pub base_delay: Duration,
    /// Cap for the backoff delay
    pub max_delay: Duration,
    /// Jitter percentage (0.0 to 1.0)
    pub jitter: f64,
    /// Decides whether a failed attempt may be retried
    pub retryable: fn(&ChatError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            retryable: is_retryable,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), without jitter:
    /// `min(base * 2^(attempt - 1), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff with symmetric jitter applied
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let capped_ms = self.delay_for_attempt(attempt).as_millis() as i64;
        if self.jitter <= 0.0 {
            return Duration::from_millis(capped_ms as u64);
        }

        let jitter_range = (capped_ms as f64 * self.jitter) as i64;
        let mut rng = rand::rng();
        let jitter_ms = rng.random_range(-jitter_range..=jitter_range);

        let final_ms = (capped_ms + jitter_ms).max(0) as u64;
        Duration::from_millis(final_ms)
    }
}

/// Default retry predicate: transient network and server failures
pub fn is_retryable(error: &ChatError) -> bool {
    match error {
        ChatError::Api(api_error) => match api_error {
            ApiError::NetworkUnavailable => true,
            ApiError::Network(_) => true,
            ApiError::ReadTimeout(_) => true,
            ApiError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),

            ApiError::Aborted(_) => false,
            ApiError::NoBody => false,
            ApiError::Parse(_) => false,
        },
        _ => false,
    }
}

/// Retry an operation with exponential backoff
///
/// # Arguments
/// * `operation` - The async operation to retry
/// * `policy` - Attempt limit, backoff and retry predicate
/// * `connectivity` - Checked before every attempt; offline fails fast
/// * `operation_name` - Name of the operation for logging
///
/// # Returns
/// Result of the last attempt
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
    connectivity: &dyn Connectivity,
    operation_name: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        if !connectivity.is_online() {
            tracing::debug!("{} skipped: network unavailable", operation_name);
            return Err(ApiError::NetworkUnavailable.into());
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded after {} attempts", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                if error.is_cancellation() {
                    tracing::debug!("{} cancelled: {}", operation_name, error);
                    return Err(error);
                }

                if !(policy.retryable)(&error) {
                    tracing::debug!(
                        "{} failed with non-retryable error: {}",
                        operation_name,
                        error
                    );
                    return Err(error);
                }

                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        "{} exhausted all {} attempts: {}",
                        operation_name,
                        policy.max_attempts,
                        error
                    );
                    return Err(error);
                }

                let delay = policy.jittered_delay(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:.1}s...",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    error,
                    delay.as_secs_f64()
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
