use std::time::Duration;
use std::future::Future;

use super::classification::ErrorClassification;
use super::types::AuditError;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

impl ErrorClassification {
    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// - TimeoutError: a flat `base`, the page already had its full timeout
    /// - Default: exponential backoff `base * 2^attempt` plus up to one `base` of jitter, capped at 30s
    pub fn retry_delay(&self, attempt: u32, base: Duration) -> Duration {
        match self.error_type {
            "TimeoutError" => base.min(MAX_DELAY),
            _ => {
                let base_secs = base.as_secs_f64();
                let exp = base_secs * 2.0_f64.powi(attempt as i32);
                let jitter = base_secs * rand::random::<f64>();
                Duration::from_secs_f64((exp + jitter).min(MAX_DELAY.as_secs_f64()))
            }
        }
    }
}

/// Retry configuration for page-level operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, AuditError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuditError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if !classification.retryable {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            "Non-retryable error, failing immediately"
                        );
                    } else {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt, config.base_delay);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AuditError::Internal("Retry loop exited unexpectedly".into())))
}
