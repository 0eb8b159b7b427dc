//! Error types for jnj-rec
//!
//! Two layers:
//! - [`BackendError`]: one backend call failed; classified as retryable,
//!   fatal, or a plain rejection.
//! - [`RecognitionError`]: pipeline-level taxonomy. Segment-level transient
//!   failures never leave the segment recognizer, track-level failures stop at
//!   the session aggregator, and only `RecognitionFatal` ends a session.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single recognition backend call
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Call exceeded the per-call timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned a 5xx response
    #[error("Server error {0}: {1}")]
    Server(u16, String),

    /// Backend rejected the call for exceeding its quota
    #[error("Rate limited by backend: {0}")]
    RateLimited(String),

    /// Credentials were refused
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend is misconfigured on our side (missing host, bad key format)
    #[error("Backend misconfigured: {0}")]
    Config(String),

    /// Backend refused this particular request (bad audio, unknown code)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// Transient conditions worth another attempt after backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout(_)
                | BackendError::Network(_)
                | BackendError::Server(..)
                | BackendError::RateLimited(_)
        )
    }

    /// Misconfiguration: retrying cannot help and the session must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Auth(_) | BackendError::Config(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            BackendError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            if status.is_server_error() {
                BackendError::Server(status.as_u16(), err.to_string())
            } else {
                BackendError::Rejected(err.to_string())
            }
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

/// Serializable error kind recorded in session summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidSegmentConfig,
    RecognitionUnavailable,
    RecognitionFatal,
    TrackProcessingFailed,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidSegmentConfig => "INVALID_SEGMENT_CONFIG",
            ErrorKind::RecognitionUnavailable => "RECOGNITION_UNAVAILABLE",
            ErrorKind::RecognitionFatal => "RECOGNITION_FATAL",
            ErrorKind::TrackProcessingFailed => "TRACK_PROCESSING_FAILED",
            ErrorKind::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Bad segment length / overlap / duration; rejected before any call
    #[error("Invalid segment config: {0}")]
    InvalidSegmentConfig(String),

    /// Transient backend failure that outlived the retry budget
    #[error("Recognition unavailable after {attempts} attempt(s): {source}")]
    RecognitionUnavailable { attempts: u32, source: BackendError },

    /// Non-retryable backend failure (credentials, configuration)
    #[error("Fatal error from {backend}: {source}")]
    RecognitionFatal {
        backend: String,
        source: BackendError,
    },

    /// Any other failure while processing one track (unreadable audio, ...)
    #[error("Track processing failed: {0}")]
    TrackProcessingFailed(String),

    /// Work stopped because the session was cancelled
    #[error("Cancelled")]
    Cancelled,
}

impl RecognitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecognitionError::InvalidSegmentConfig(_) => ErrorKind::InvalidSegmentConfig,
            RecognitionError::RecognitionUnavailable { .. } => ErrorKind::RecognitionUnavailable,
            RecognitionError::RecognitionFatal { .. } => ErrorKind::RecognitionFatal,
            RecognitionError::TrackProcessingFailed(_) => ErrorKind::TrackProcessingFailed,
            RecognitionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognitionError::RecognitionFatal { .. })
    }
}

impl From<jnj_common::Error> for RecognitionError {
    fn from(err: jnj_common::Error) -> Self {
        match err {
            jnj_common::Error::InvalidInput(msg) => RecognitionError::InvalidSegmentConfig(msg),
            other => RecognitionError::TrackProcessingFailed(other.to_string()),
        }
    }
}

/// Result type for pipeline operations
pub type RecognitionResult<T> = Result<T, RecognitionError>;
