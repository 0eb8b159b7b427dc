//! jnj-rec library interface
//!
//! Song recognition over long audio recordings (DJ sets, videos):
//! - `services::segmenter` cuts each track into overlapping windows
//! - `services::segment_recognizer` submits windows to a recognition backend
//!   under shared rate limiting, per-call timeouts and retry with backoff
//! - `services::result_merger` collapses per-window detections into a
//!   non-overlapping track list
//! - `services::session_aggregator` runs a batch of tracks as one session
//!
//! Exposes public APIs for the CLI and integration tests.

pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod services;

pub use crate::error::{BackendError, ErrorKind, RecognitionError, RecognitionResult};
pub use crate::models::{
    AudioSource, AudioTrack, MergedDetection, PipelineParameters, RawDetection, Segment,
    SegmentConfig, SessionState, SessionSummary, TrackMatch, TrackOutcome,
};
pub use crate::services::{RecognitionBackend, RecognitionClient, SessionAggregator};
