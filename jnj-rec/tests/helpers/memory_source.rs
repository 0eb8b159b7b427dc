//! In-memory audio sources
//!
//! Windows are "encoded" as `track_id|start_ms|end_ms` so a scripted backend
//! can decide its reply from the window it was sent.

use async_trait::async_trait;
use jnj_rec::models::{AudioSource, AudioSourceError, AudioTrack};
use std::sync::Arc;

/// Window decoded from the bytes an [`InMemorySource`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub track_id: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

pub struct InMemorySource {
    track_id: String,
    duration_ms: u64,
}

#[async_trait]
impl AudioSource for InMemorySource {
    async fn read_window(&self, start_ms: u64, end_ms: u64) -> Result<Vec<u8>, AudioSourceError> {
        if start_ms >= end_ms || end_ms > self.duration_ms {
            return Err(AudioSourceError::OutOfRange {
                start_ms,
                end_ms,
                duration_ms: self.duration_ms,
            });
        }
        Ok(format!("{}|{}|{}", self.track_id, start_ms, end_ms).into_bytes())
    }
}

/// Track of `duration_ms` backed by an [`InMemorySource`]
pub fn memory_track(id: &str, duration_ms: u64) -> AudioTrack {
    let source = InMemorySource {
        track_id: id.to_string(),
        duration_ms,
    };
    AudioTrack::new(id, duration_ms, Arc::new(source))
}

/// Parse bytes produced by [`InMemorySource`]
pub fn decode_window(audio: &[u8]) -> Option<Window> {
    let text = std::str::from_utf8(audio).ok()?;
    let mut parts = text.rsplitn(3, '|');
    let end_ms = parts.next()?.parse().ok()?;
    let start_ms = parts.next()?.parse().ok()?;
    let track_id = parts.next()?.to_string();
    Some(Window {
        track_id,
        start_ms,
        end_ms,
    })
}

/// Source whose reads fail from `fail_from_ms` onwards
pub struct FailingSource {
    inner: InMemorySource,
    fail_from_ms: u64,
}

impl FailingSource {
    pub fn track(id: &str, duration_ms: u64, fail_from_ms: u64) -> AudioTrack {
        let source = FailingSource {
            inner: InMemorySource {
                track_id: id.to_string(),
                duration_ms,
            },
            fail_from_ms,
        };
        AudioTrack::new(id, duration_ms, Arc::new(source))
    }
}

#[async_trait]
impl AudioSource for FailingSource {
    async fn read_window(&self, start_ms: u64, end_ms: u64) -> Result<Vec<u8>, AudioSourceError> {
        if start_ms >= self.fail_from_ms {
            return Err(AudioSourceError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "source truncated",
            )));
        }
        self.inner.read_window(start_ms, end_ms).await
    }
}
