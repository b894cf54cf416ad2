//! Retry-with-backoff for forge requests (spec.md §4.1, §5).
//!
//! Ported from `retry()` in `lib/aio/github.py`: four attempts at
//! delays `1, 2, 4, 8` seconds, then one final bare attempt whose
//! error propagates.

use std::future::Future;
use std::time::Duration;

use crate::error::ForgeError;

const DELAYS_SECS: [u64; 4] = [1, 2, 4, 8];

pub async fn retry_http<T, F, Fut>(mut attempt: F) -> Result<T, ForgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    for delay in DELAYS_SECS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, delay_secs = delay, "transient forge error, retrying");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }

    // Final attempt: its error, if any, propagates uncaught.
    attempt().await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = tokio::time::Instant::now();

        let result = retry_http(|| {
            let calls = calls.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(ForgeError::Status {
                        url: "x".into(),
                        status: reqwest::StatusCode::BAD_GATEWAY,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Observed delays: 1s then 2s.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_fails_immediately_without_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = tokio::time::Instant::now();

        let result: Result<(), ForgeError> = retry_http(|| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ForgeError::Status { url: "x".into(), status: reqwest::StatusCode::NOT_FOUND })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_all_retries_propagates_final_error() {
        let result: Result<(), ForgeError> = retry_http(|| async {
            Err(ForgeError::Status { url: "x".into(), status: reqwest::StatusCode::BAD_GATEWAY })
        })
        .await;

        assert!(result.is_err());
    }
}
