use std::time::Duration;

use backoff::backoff::Constant;
use tracing::warn;

use crate::errors::ProviderError;

/// Fixed-delay retry for transient provider failures.
///
/// Only errors for which `ProviderError::is_transient` holds are retried.
/// After `max_attempts` calls the last error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn call<T, F>(&self, operation: &str, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Result<T, ProviderError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        let op = || {
            attempt += 1;
            match f() {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        };

        let notify = |err: ProviderError, wait: Duration| {
            warn!(
                operation,
                error = %err,
                retry_in_ms = wait.as_millis() as u64,
                "Transient provider error, retrying"
            );
        };

        backoff::retry_notify(Constant::new(self.delay), op, notify).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}
