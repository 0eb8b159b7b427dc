//! Audio track input model
//!
//! The pipeline never decodes audio itself. An [`AudioSource`] hands back
//! already-encoded bytes for a time window, ready to upload to a backend.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure to produce audio bytes for a window
#[derive(Debug, Error)]
pub enum AudioSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Window {start_ms}-{end_ms} ms is outside the source (duration {duration_ms} ms)")]
    OutOfRange {
        start_ms: u64,
        end_ms: u64,
        duration_ms: u64,
    },

    #[error("Encode error: {0}")]
    Encode(String),
}

/// Provider of encoded audio for arbitrary windows of one track
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Encoded bytes covering `[start_ms, end_ms)`
    async fn read_window(&self, start_ms: u64, end_ms: u64) -> Result<Vec<u8>, AudioSourceError>;
}

/// One audio track to recognize; immutable and owned by the caller
#[derive(Clone)]
pub struct AudioTrack {
    /// Stable identifier outcomes are recorded against (video id, file path, ...)
    pub id: String,
    pub duration_ms: u64,
    source: Arc<dyn AudioSource>,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, duration_ms: u64, source: Arc<dyn AudioSource>) -> Self {
        Self {
            id: id.into(),
            duration_ms,
            source,
        }
    }

    pub fn source(&self) -> &Arc<dyn AudioSource> {
        &self.source
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.id)
            .field("duration_ms", &self.duration_ms)
            .finish_non_exhaustive()
    }
}
