//! Bounded retry for transport failures.

use std::future::Future;
use std::time::Duration;

use core_runtime::config::{EngineConfig, DEFAULT_STREAM_RETRY_ATTEMPTS};
use tracing::{info, warn};

use crate::Result;

/// Retry policy applied to content streaming.
///
/// Only `SyncError::Transport` is retried; any other error is returned
/// from the attempt that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Policy making `retries` additional attempts after the first
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            delay,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.stream_retry_attempts, config.stream_retry_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails with a non-transport error,
    /// or the attempt budget is spent. The attempt number (from 1) is passed
    /// to each call.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transport() && attempt < self.max_attempts => {
                    info!("Exception: {}", e);
                    warn!(
                        "Ignoring exception while trying to {}, will retry {} more times before stopping",
                        what,
                        self.max_attempts - attempt
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) => {
                    if e.is_transport() {
                        warn!("Failed to {} after {} attempts: {}", what, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_RETRY_ATTEMPTS, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;
    use bridge_traits::ContentSourceId;
    use std::io;

    fn transport() -> SyncError {
        SyncError::Transport {
            source_id: ContentSourceId(1),
            cause: io::Error::new(io::ErrorKind::TimedOut, "timed out"),
        }
    }

    #[tokio::test]
    async fn test_default_makes_four_attempts() {
        let policy = RetryPolicy::default();
        let mut calls = 0;

        let result: Result<()> = policy
            .run("open stream", |_| {
                calls += 1;
                async { Err(transport()) }
            })
            .await;

        assert!(result.unwrap_err().is_transport());
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();

        let result = policy
            .run("open stream", |attempt| async move {
                if attempt < 3 {
                    Err(transport())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_transport_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut calls = 0;

        let result: Result<()> = policy
            .run("open stream", |_| {
                calls += 1;
                async { Err(SyncError::IllegalState("boom".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(SyncError::IllegalState(_))));
        assert_eq!(calls, 1);
    }
}
