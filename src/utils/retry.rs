// Retry with exponential backoff

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped, plus up to 10% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
        let jitter_ms = (delay.as_millis() as u64) / 10;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }

    /// Longest total sleep across every retry, jitter included.
    pub fn max_total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| {
                let exp = attempt.saturating_sub(1).min(16);
                let delay = self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay);
                delay + delay / 10
            })
            .sum()
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= policy.max_attempts || !is_retryable(&error) {
                    return Err(error);
                }

                let delay = policy.backoff_delay(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after failure"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let first = policy.backoff_delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        let third = policy.backoff_delay(3);
        assert!(third >= Duration::from_millis(350) && third <= Duration::from_millis(385));
    }

    #[test]
    fn test_max_total_backoff_bounds_every_sleep() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        // 1s + 2s, each with 10% jitter headroom
        assert_eq!(policy.max_total_backoff(), Duration::from_millis(3_300));
        let slept = policy.backoff_delay(1) + policy.backoff_delay(2);
        assert!(slept <= policy.max_total_backoff());

        assert_eq!(RetryPolicy::new(1, Duration::from_secs(1)).max_total_backoff(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("fail {}", n)) } else { Ok(n) }
            },
            fast(5),
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn test_gives_up_at_cap() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always".to_string())
            },
            fast(3),
            |_| true,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let _: Result<(), String> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
            fast(5),
            |e: &String| e != "fatal",
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
