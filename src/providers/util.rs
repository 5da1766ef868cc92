use anyhow::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Retries an async operation with exponential backoff
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `max_attempts`: Total number of runs before giving up
/// - `initial_delay_ms`: Delay before the first retry; doubles each attempt
///
/// # Returns
/// Either the successful result or the last error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    max_attempts: usize,
    initial_delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    let mut delay_ms = initial_delay_ms;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {}ms...",
                    attempt, max_attempts, err, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
                delay_ms = delay_ms.saturating_mul(2);
            }
        }
    }
}

/// Enforces a minimum delay between consecutive calls to the same provider
/// so a burst of pair fetches never trips its rate limits.
pub struct Throttle {
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_delay: Duration) -> Self {
        Throttle {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until at least `min_delay` has elapsed since the previous call,
    /// then claims the slot.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
