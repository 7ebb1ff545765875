use crate::config::{Backoff, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Execute an async operation, retrying failures that `retry_if` accepts.
///
/// Fixed backoff waits `delay_ms` between attempts; exponential doubles it and
/// adds up to `delay_ms` of jitter.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    retry_if: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;
    let mut delay_ms = config.delay_ms;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempts >= max_attempts || !retry_if(&e) => {
                if attempts > 1 {
                    warn!("All {} attempts failed: {}", attempts, e);
                }
                return Err(e);
            }
            Err(e) => {
                let delay = match config.backoff {
                    Backoff::Fixed => Duration::from_millis(delay_ms),
                    Backoff::Exponential => {
                        let jitter = if config.delay_ms > 0 {
                            rand::random::<u64>() % config.delay_ms
                        } else {
                            0
                        };
                        let delay = Duration::from_millis(delay_ms + jitter);
                        delay_ms = delay_ms.saturating_mul(2);
                        delay
                    }
                };

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                sleep(delay).await;
            }
        }
    }
}
