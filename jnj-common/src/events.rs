//! Event types for recognition progress reporting
//!
//! The session aggregator publishes [`RecognitionEvent`]s on an [`EventBus`];
//! the CLI (or any other front end) subscribes to render progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Recognition progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecognitionEvent {
    /// Session moved from Created to Running
    SessionStarted {
        session_id: Uuid,
        name: String,
        total_tracks: usize,
        timestamp: DateTime<Utc>,
    },

    /// A track worker picked up a track
    TrackStarted {
        session_id: Uuid,
        track_id: String,
        segment_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One segment finished recognition (match or no-match)
    SegmentRecognized {
        session_id: Uuid,
        track_id: String,
        segment_index: usize,
        start_ms: u64,
        end_ms: u64,
        /// `None` when the segment was not recognized
        title: Option<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Track finished with a merged track list
    TrackCompleted {
        session_id: Uuid,
        track_id: String,
        detections: usize,
        timestamp: DateTime<Utc>,
    },

    /// Track finished with a track-level failure
    TrackFailed {
        session_id: Uuid,
        track_id: String,
        error_kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Track was cancelled before it finished
    TrackCancelled {
        session_id: Uuid,
        track_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Every track reached a terminal outcome without a fatal error
    SessionCompleted {
        session_id: Uuid,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        timestamp: DateTime<Utc>,
    },

    /// A fatal backend error stopped the session
    SessionAborted {
        session_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl RecognitionEvent {
    /// Session this event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            RecognitionEvent::SessionStarted { session_id, .. }
            | RecognitionEvent::TrackStarted { session_id, .. }
            | RecognitionEvent::SegmentRecognized { session_id, .. }
            | RecognitionEvent::TrackCompleted { session_id, .. }
            | RecognitionEvent::TrackFailed { session_id, .. }
            | RecognitionEvent::TrackCancelled { session_id, .. }
            | RecognitionEvent::SessionCompleted { session_id, .. }
            | RecognitionEvent::SessionAborted { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for [`RecognitionEvent`]s
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RecognitionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RecognitionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RecognitionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
