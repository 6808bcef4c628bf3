//! Bounded retry with exponential backoff.
//!
//! Only transient errors are retried; everything else propagates on the
//! first failure. A success after retries is observationally identical
//! to a run with no transient error.

use std::future::Future;
use tracing::warn;

use shipit_config::RetryConfig;
use shipit_core::Result;

/// Run `op` up to `policy.attempts` times, sleeping `policy.backoff`
/// (doubling each time) between transient failures.
pub async fn retry_transient<T, F, Fut>(policy: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                warn!(attempt, error = %e, "Transient failure, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipit_core::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result = retry_transient(&policy(3), || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_within_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result = retry_transient(&policy(3), || {
            let counted = counted.clone();
            async move {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Transient("connection reset".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bound_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result: Result<u32> = retry_transient(&policy(3), || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transient("still down".to_string()))
            }
        })
        .await;

        assert!(matches!(result.unwrap_err(), Error::Transient(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let result: Result<u32> = retry_transient(&policy(3), || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(Error::Auth("bad password".to_string()))
            }
        })
        .await;

        assert!(matches!(result.unwrap_err(), Error::Auth(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
