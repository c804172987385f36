use tokio::time::{sleep, Duration};
use tracing::{error, warn};

/// Bounded retry with exponential backoff: `base_delay_ms * 2^attempt`,
/// capped at `max_delay_ms`. Attempt count starts at 0.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn new(attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempts,
            base_delay_ms,
            max_delay_ms: Self::default().max_delay_ms,
        }
    }

    /// Delay to sleep after the given zero-based attempt failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }

    pub async fn run_with_retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        // At least one attempt always runs, even with a zero budget.
        for attempt in 0..self.attempts.max(1) {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "attempt {}/{} failed: {e}, retrying in {:?}",
                        attempt + 1,
                        self.attempts,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!("all {} attempts failed: {e}", self.attempts);
                    return Err(e);
                }
            }
        }
        unreachable!("retry loop exhausted unexpectedly")
    }
}
