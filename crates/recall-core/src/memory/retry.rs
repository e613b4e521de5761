//! Bounded retry with exponential backoff for storage calls.

use std::future::Future;
use std::time::Duration;

use recall_types::config::RetryConfig;
use recall_types::error::RepositoryError;
use tracing::warn;

/// Per-attempt timeout plus backoff for transient repository failures.
///
/// Only errors classified transient by [`RepositoryError::is_transient`]
/// are retried; everything else returns immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Timeout(self.timeout.as_millis() as u64)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
