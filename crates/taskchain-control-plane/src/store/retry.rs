//! Bounded retries for store calls made by background loops.

use std::fmt::Display;
use std::future::Future;

use taskchain_core::RetryPolicy;
use tracing::warn;

use super::StoreError;

/// Errors that may succeed when the same call is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// How often and how patiently to repeat a failed store call.
#[derive(Debug, Clone, Copy)]
pub struct StoreRetry {
    /// Total tries, including the first.
    pub attempts: u32,
    pub backoff: RetryPolicy,
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, E, F, Fut>(retry: &StoreRetry, what: &str, mut op: F) -> Result<T, E>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retry.attempts => {
                let delay = retry.backoff.delay_for(attempt);
                warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
