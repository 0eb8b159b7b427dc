//! Data models for the recognition pipeline

pub mod audio_track;
pub mod detection;
pub mod parameters;
pub mod segment;
pub mod session;

pub use audio_track::{AudioSource, AudioSourceError, AudioTrack};
pub use detection::{MergedDetection, RawDetection, ReviewFlag, TrackMatch};
pub use parameters::{MergeParameters, PipelineParameters, RetryPolicy};
pub use segment::{Segment, SegmentConfig};
pub use session::{
    RecognitionSession, SessionState, SessionStatistics, SessionSummary, StateTransition,
    TrackFailure, TrackOutcome,
};
