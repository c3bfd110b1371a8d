use std::future::Future;
use std::time::Duration;

use crate::error::{BackupError, Result};

/// Default number of attempts per unit of work
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the attempt bound is reached. Returns the last error in the failure cases.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    operation = %label,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Request timed out, retrying"
                );
                last_error = Some(e);

                if attempt + 1 < policy.max_attempts && !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    tracing::error!(
        operation = %label,
        attempts = policy.max_attempts,
        "Giving up after all retries"
    );
    Err(last_error.unwrap_or_else(|| BackupError::internal(format!("{} made no attempts", label))))
}
