use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_attempts: u32,
    /// Applied to each attempt independently
    pub timeout: Duration,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (1-based), growing linearly
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// A timed out attempt is dropped, which aborts its request
pub(crate) async fn send_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, TransportError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, attempt(number)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if number >= max_attempts => return Err(err),
            Err(err) => {
                let delay = policy.backoff(number);
                warn!(
                    "attempt {}/{} failed ({}), retrying in {:?}",
                    number, max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
                number += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
            backoff_step: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_exhaust_all_attempts() {
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = send_with_retry(&policy(), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            std::future::pending()
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // three timeouts plus 1s and 2s of backoff
        assert!(started.elapsed() >= Duration::from_secs(93));
    }

    #[tokio::test(start_paused = true)]
    async fn success_stops_retrying() {
        let attempts = AtomicU32::new(0);

        let result = send_with_retry(&policy(), |number| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if number == 1 {
                    Err(TransportError::connection("refused"))
                } else {
                    Ok(number)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn last_error_kind_is_preserved() {
        let result: Result<(), _> = send_with_retry(&policy(), |number| async move {
            if number < 3 {
                Err(TransportError::timeout(Duration::from_secs(30)))
            } else {
                Err(TransportError::connection("refused"))
            }
        })
        .await;

        assert_eq!(
            result.unwrap_err().kind,
            TransportErrorKind::ConnectionFailure
        );
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
    }
}
