//! Test Helper Utilities
//!
//! Shared utilities for testing jnj-rec

#![allow(dead_code)]

pub mod audio_generator;
pub mod memory_source;
pub mod scripted_backend;

// Re-export commonly used items
pub use audio_generator::{generate_test_wav, AudioConfig};
pub use memory_source::{decode_window, memory_track, FailingSource, Window};
pub use scripted_backend::{Reply, ScriptedBackend};

use jnj_rec::models::{PipelineParameters, RetryPolicy};
use jnj_rec::services::{RecognitionClient, SharedRateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy with short delays: 3 attempts, 100 ms doubling backoff, 1 s timeout
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(1_000),
        multiplier: 2.0,
        call_timeout: Duration::from_secs(1),
    }
}

/// Parameters matching [`fast_policy`] with no rate limiting
pub fn fast_parameters() -> PipelineParameters {
    PipelineParameters {
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
        call_timeout_ms: 1_000,
        rate_limit_spacing_ms: 0,
        ..PipelineParameters::default()
    }
}

/// Unlimited client over `backend`; safe under paused tokio time
pub fn client(backend: Arc<ScriptedBackend>, policy: RetryPolicy) -> RecognitionClient {
    RecognitionClient::new(backend, SharedRateLimiter::unlimited(), policy)
}
