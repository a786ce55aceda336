use log::{error, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

/// Execute an async operation with exponential backoff. Errors for which
/// `should_retry` returns false are returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    warn!(
                        "Operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !should_retry(&error) {
                    error!("Operation '{}' failed: {}", operation_name, error);
                    return Err(error);
                }
                if attempt >= config.max_attempts {
                    error!(
                        "Operation '{}' failed after {} attempts. Final error: {}",
                        operation_name, attempt, error
                    );
                    return Err(error);
                }

                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempt, config.max_attempts, error, delay
                );

                sleep(delay).await;

                delay = Duration::from_millis(
                    (delay.as_millis() as f64 * config.exponential_base) as u64,
                );
                if delay > config.max_delay {
                    delay = config.max_delay;
                }
            }
        }
    }
}

/// Retry configuration for tracking service calls
pub fn tracking_retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        exponential_base: 2.0,
    }
}
