//! Recognition capability over pluggable fingerprint backends
//!
//! [`RecognitionBackend`] is the per-service boundary (one implementation per
//! service). [`RecognitionClient`] wraps a backend with the shared rate
//! limiter, the per-call timeout and the bounded retry loop.

use crate::error::{BackendError, RecognitionResult};
use crate::models::{PipelineParameters, RetryPolicy, TrackMatch};
use crate::services::rate_limiter::SharedRateLimiter;
use crate::services::retry::retry_with_backoff;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one successful backend call
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    /// `None` when the backend found no match
    pub track: Option<TrackMatch>,
    /// Normalized 0.0-1.0
    pub confidence: f64,
    /// Response body as received
    pub raw: serde_json::Value,
}

impl BackendResponse {
    pub fn matched(track: TrackMatch, confidence: f64, raw: serde_json::Value) -> Self {
        Self {
            track: Some(track),
            confidence: confidence.clamp(0.0, 1.0),
            raw,
        }
    }

    pub fn no_match(raw: serde_json::Value) -> Self {
        Self {
            track: None,
            confidence: 0.0,
            raw,
        }
    }
}

/// One fingerprint recognition service
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Short identifier recorded on every detection ("acrcloud", "audd")
    fn name(&self) -> &str;

    /// Identify one encoded audio sample
    async fn identify(&self, audio: &[u8]) -> Result<BackendResponse, BackendError>;
}

/// Rate-limited, retrying recognition client
///
/// Cheap to clone; clones share the backend and the rate limiter.
#[derive(Clone)]
pub struct RecognitionClient {
    backend: Arc<dyn RecognitionBackend>,
    rate_limiter: SharedRateLimiter,
    policy: RetryPolicy,
}

impl RecognitionClient {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        rate_limiter: SharedRateLimiter,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            rate_limiter,
            policy,
        }
    }

    /// Client with its own limiter built from `parameters`
    pub fn from_parameters(
        backend: Arc<dyn RecognitionBackend>,
        parameters: &PipelineParameters,
    ) -> Self {
        Self::new(
            backend,
            SharedRateLimiter::new(parameters.rate_limit_spacing()),
            parameters.retry_policy(),
        )
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Recognize one audio sample.
    ///
    /// Each attempt waits for a rate-limit slot, then makes one call bounded
    /// by the policy's timeout. Errors:
    /// - `RecognitionUnavailable` after the attempt ceiling or on a rejection
    /// - `RecognitionFatal` on credential/configuration errors
    /// - `Cancelled` when `cancel` fires during a call, wait or backoff
    pub async fn recognize(
        &self,
        audio: &[u8],
        cancel: &CancellationToken,
    ) -> RecognitionResult<BackendResponse> {
        let backend = self.backend.as_ref();
        let call_timeout = self.policy.call_timeout;

        retry_with_backoff(backend.name(), &self.policy, cancel, |attempt| async move {
            self.rate_limiter.until_ready().await;

            tracing::trace!(
                backend = backend.name(),
                attempt,
                bytes = audio.len(),
                "Submitting sample"
            );

            match tokio::time::timeout(call_timeout, backend.identify(audio)).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(call_timeout)),
            }
        })
        .await
    }
}

impl std::fmt::Debug for RecognitionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionClient")
            .field("backend", &self.backend.name())
            .field("rate_limiter", &self.rate_limiter)
            .field("policy", &self.policy)
            .finish()
    }
}
