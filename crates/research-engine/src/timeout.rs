//! Deadline guard for upstream calls.
//!
//! Races a future against a timer. When the timer fires first the future is
//! dropped; the remote request may still complete server-side, but its
//! result is discarded here rather than written to an abandoned slot. No
//! retry.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The guarded operation exceeded its deadline.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TimeoutError {
    pub message: String,
}

/// Run `fut` with a deadline, converting "too slow" into [`TimeoutError`]
/// with the supplied message.
pub async fn with_timeout<T, F>(
    fut: F,
    limit: Duration,
    message: impl Into<String>,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Ok(value),
        Err(_) => Err(TimeoutError {
            message: message.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Instant};

    #[tokio::test]
    async fn fast_operation_passes_through() {
        let result = with_timeout(async { 42 }, Duration::from_secs(1), "too slow").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_operation_resolves_at_the_deadline() {
        let start = Instant::now();
        let result = with_timeout(
            async {
                sleep(Duration::from_secs(300)).await;
                "never"
            },
            Duration::from_secs(30),
            "query 1 timed out",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.message, "query 1 timed out");
        // Resolves at deadline + ε, not when the underlying operation would
        // have completed.
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn error_results_are_not_swallowed() {
        let result: Result<Result<(), &str>, TimeoutError> = with_timeout(
            async { Err("upstream failed") },
            Duration::from_secs(30),
            "unused",
        )
        .await;
        assert_eq!(result.unwrap(), Err("upstream failed"));
    }
}
