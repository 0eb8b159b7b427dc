//! Bounded retry with exponential backoff for backend calls
//!
//! Classifies every [`BackendError`]:
//! - fatal (credentials, configuration): stop at once with `RecognitionFatal`
//! - retryable (timeout, 5xx, rate limit, network): back off and try again
//!   until the attempt ceiling, then `RecognitionUnavailable`
//! - anything else: `RecognitionUnavailable` without retrying
//!
//! Every attempt and every backoff sleep is raced against the cancellation
//! token, so a cancelled session never waits out a backoff.

use crate::error::{BackendError, RecognitionError, RecognitionResult};
use crate::models::RetryPolicy;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempt ceiling is reached.
///
/// # Arguments
/// * `backend` - Backend name for logging and `RecognitionFatal`
/// * `policy` - Attempt ceiling and backoff schedule
/// * `cancel` - Session cancellation token
/// * `operation` - Called with the 1-based attempt number
pub async fn retry_with_backoff<F, Fut, T>(
    backend: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> RecognitionResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(RecognitionError::Cancelled);
        }

        if attempt > 1 {
            tracing::debug!(backend, attempt, "Retrying recognition call");
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
            result = operation(attempt) => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(backend, attempt, "Recognition call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if err.is_fatal() {
            tracing::error!(backend, attempt, error = %err, "Fatal recognition error");
            return Err(RecognitionError::RecognitionFatal {
                backend: backend.to_string(),
                source: err,
            });
        }

        if !err.is_retryable() {
            tracing::warn!(backend, attempt, error = %err, "Recognition call rejected");
            return Err(RecognitionError::RecognitionUnavailable {
                attempts: attempt,
                source: err,
            });
        }

        if attempt >= max_attempts {
            tracing::warn!(
                backend,
                attempt,
                error = %err,
                "Recognition unavailable: attempt ceiling reached"
            );
            return Err(RecognitionError::RecognitionUnavailable {
                attempts: attempt,
                source: err,
            });
        }

        let backoff = policy.backoff_for(attempt);
        tracing::warn!(
            backend,
            attempt,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Transient recognition error, will retry after backoff"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RecognitionError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
