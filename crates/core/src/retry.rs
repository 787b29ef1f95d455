// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff for transient store failures

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy
///
/// After the `n`th failure (counting from 1) the policy sleeps `base * 2^n`
/// before trying again, up to `attempts` total invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first
    pub attempts: u32,
    /// Backoff base
    #[serde(with = "humantime_serde")]
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sleep before the retry that follows the `failures`th failure
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }

    /// Run `op`, retrying errors accepted by `is_retryable`.
    ///
    /// Errors rejected by `is_retryable` are returned immediately. When the
    /// attempts are used up the last error is returned.
    pub async fn run<T, E, R, F, Fut>(&self, is_retryable: R, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut failures = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    failures += 1;
                    if !is_retryable(&e) || failures >= self.attempts.max(1) {
                        return Err(e);
                    }
                    let delay = self.delay(failures);
                    tracing::warn!(
                        attempt = failures,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
