//! Backoff for read-only external calls
//!
//! Order placement must never go through here.

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

use super::errors::{ErrorKind, Result};

/// Attempt budget and first delay for a read-only call
#[derive(Debug, Clone, Copy)]
pub struct ReadRetry {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl ReadRetry {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient kind, or the
    /// attempt budget is spent. Only `Unavailable` errors are retried.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_attempts = self.max_attempts;

        backoff::future::retry(policy, || {
            let fut = op();
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if attempt >= max_attempts || !e.is(ErrorKind::Unavailable) => {
                        Err(backoff::Error::permanent(e))
                    }
                    Err(e) => {
                        debug!(call = label, attempt, error = %e, "read failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        })
        .await
    }
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}
