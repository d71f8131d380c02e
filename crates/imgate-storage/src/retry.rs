//! Exponential backoff for remote calls that are allowed to retry.

use std::future::Future;
use std::time::Duration;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (zero based): `2^attempt * base`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `op` up to `retries + 1` times, sleeping between failures. Returns the last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        operation = what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation = what,
                        attempts = attempt + 1,
                        error = %e,
                        "Remote call failed, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_gives_up_after_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            retries: 3,
            base: Duration::from_millis(1),
        };

        let result: Result<(), String> = policy
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy {
            retries: 3,
            base: Duration::from_millis(1),
        };

        let result: Result<u32, String> = policy
            .run("test", |attempt| async move {
                if attempt < 2 {
                    Err(format!("attempt {}", attempt))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }
}
