//! Recognition session state machine and summary
//!
//! Created → Running → { Completed, FatalAborted }
//!
//! - Created → Running on the first track submission
//! - track successes and track-level failures keep the session Running
//! - a fatal backend error moves it to FatalAborted
//! - closing a Running session with no fatal error moves it to Completed;
//!   tracks still pending at that point are recorded as Cancelled

use crate::error::{ErrorKind, RecognitionError};
use crate::models::detection::MergedDetection;
use crate::models::parameters::PipelineParameters;
use chrono::{DateTime, Utc};
use jnj_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No track submitted yet
    Created,
    /// At least one track submitted, session not closed
    Running,
    /// All tracks terminal, no fatal error
    Completed,
    /// A fatal backend error stopped the session
    FatalAborted,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Terminal outcome of one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackOutcome {
    Succeeded {
        detections: Vec<MergedDetection>,
        /// Segments submitted for this track
        segments: usize,
        /// Segments that came back with a match
        recognized_segments: usize,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

impl TrackOutcome {
    /// Outcome for a track whose pipeline returned an error
    pub fn from_error(err: &RecognitionError) -> Self {
        match err {
            RecognitionError::Cancelled => TrackOutcome::Cancelled,
            other => TrackOutcome::Failed {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

/// Recognition session (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionSession {
    pub session_id: Uuid,
    /// Caller-supplied label (playlist name, batch name, ...)
    pub name: String,
    /// Backend identifier every track in this session is recognized with
    pub backend: String,
    pub state: SessionState,
    pub parameters: PipelineParameters,
    /// Outcome per track; `None` while the track is still pending
    tracks: BTreeMap<String, Option<TrackOutcome>>,
    /// Message of the error that aborted the session
    pub fatal_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RecognitionSession {
    pub fn new(
        name: impl Into<String>,
        backend: impl Into<String>,
        parameters: PipelineParameters,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            name: name.into(),
            backend: backend.into(),
            state: SessionState::Created,
            parameters,
            tracks: BTreeMap::new(),
            fatal_error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if matches!(new_state, SessionState::Completed | SessionState::FatalAborted) {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Completed | SessionState::FatalAborted
        )
    }

    /// Register a track as pending.
    ///
    /// Returns the Created → Running transition on the first submission.
    pub fn submit_track(&mut self, track_id: &str) -> Result<Option<StateTransition>> {
        if self.is_terminal() {
            return Err(Error::InvalidInput(format!(
                "Session {} is already {:?}",
                self.session_id, self.state
            )));
        }
        if self.tracks.contains_key(track_id) {
            return Err(Error::InvalidInput(format!(
                "Track {} submitted twice",
                track_id
            )));
        }

        self.tracks.insert(track_id.to_string(), None);

        if self.state == SessionState::Created {
            Ok(Some(self.transition_to(SessionState::Running)))
        } else {
            Ok(None)
        }
    }

    /// Record the terminal outcome of a submitted track.
    ///
    /// Outcomes are accepted after a fatal abort so results of tracks that
    /// finished concurrently are preserved.
    pub fn record_outcome(&mut self, track_id: &str, outcome: TrackOutcome) -> Result<()> {
        if self.state == SessionState::Completed {
            return Err(Error::InvalidInput(format!(
                "Session {} is already completed",
                self.session_id
            )));
        }
        match self.tracks.get_mut(track_id) {
            None => Err(Error::InvalidInput(format!(
                "Track {} was never submitted",
                track_id
            ))),
            Some(Some(_)) => Err(Error::InvalidInput(format!(
                "Track {} already has an outcome",
                track_id
            ))),
            Some(slot) => {
                *slot = Some(outcome);
                Ok(())
            }
        }
    }

    /// Move to FatalAborted. No-op once the session is terminal.
    pub fn abort(&mut self, reason: impl Into<String>) -> Option<StateTransition> {
        if self.is_terminal() {
            return None;
        }
        self.fatal_error = Some(reason.into());
        Some(self.transition_to(SessionState::FatalAborted))
    }

    /// Finalize the session: pending tracks become Cancelled and a
    /// non-aborted session becomes Completed.
    ///
    /// An empty session (nothing ever submitted) completes directly.
    pub fn close(&mut self) -> Option<StateTransition> {
        for outcome in self.tracks.values_mut() {
            if outcome.is_none() {
                *outcome = Some(TrackOutcome::Cancelled);
            }
        }

        if self.is_terminal() {
            None
        } else {
            Some(self.transition_to(SessionState::Completed))
        }
    }

    pub fn total_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Track ids still waiting for an outcome
    pub fn pending_tracks(&self) -> Vec<String> {
        self.tracks
            .iter()
            .filter(|(_, outcome)| outcome.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn outcome(&self, track_id: &str) -> Option<&TrackOutcome> {
        self.tracks.get(track_id).and_then(|o| o.as_ref())
    }

    /// Plain-data summary of the session so far
    pub fn summary(&self) -> SessionSummary {
        let mut summary = SessionSummary {
            session_id: self.session_id,
            name: self.name.clone(),
            backend: self.backend.clone(),
            state: self.state,
            started_at: self.started_at,
            ended_at: self.ended_at,
            total_tracks: self.tracks.len(),
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            pending: 0,
            segments_submitted: 0,
            segments_recognized: 0,
            fatal_error: self.fatal_error.clone(),
            failures: Vec::new(),
            cancelled_tracks: Vec::new(),
            detections: Vec::new(),
        };

        // BTreeMap iteration keeps detections grouped by track id, each
        // track's list already time ordered
        for (track_id, outcome) in &self.tracks {
            match outcome {
                Some(TrackOutcome::Succeeded {
                    detections,
                    segments,
                    recognized_segments,
                }) => {
                    summary.succeeded += 1;
                    summary.segments_submitted += segments;
                    summary.segments_recognized += recognized_segments;
                    summary.detections.extend(detections.iter().cloned());
                }
                Some(TrackOutcome::Failed { kind, message }) => {
                    summary.failed += 1;
                    summary.failures.push(TrackFailure {
                        track_id: track_id.clone(),
                        kind: *kind,
                        message: message.clone(),
                    });
                }
                Some(TrackOutcome::Cancelled) => {
                    summary.cancelled += 1;
                    summary.cancelled_tracks.push(track_id.clone());
                }
                None => summary.pending += 1,
            }
        }

        summary
    }
}

/// One failed track in a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFailure {
    pub track_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Session result handed to the caller for persistence and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub name: String,
    pub backend: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_tracks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Tracks without an outcome (only before the session is closed)
    pub pending: usize,
    pub segments_submitted: usize,
    pub segments_recognized: usize,
    pub fatal_error: Option<String>,
    pub failures: Vec<TrackFailure>,
    pub cancelled_tracks: Vec<String>,
    /// Merged detections of every succeeded track, by track id then time
    pub detections: Vec<MergedDetection>,
}

/// Aggregate figures over a session's detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_detections: usize,
    pub unique_songs: usize,
    pub unique_artists: usize,
    pub average_confidence: f64,
    /// Sample standard deviation; 0.0 below two detections
    pub confidence_std: f64,
    /// Tracks that produced at least one detection
    pub tracks_with_detections: usize,
    /// Most frequent titles, at most ten
    pub top_songs: Vec<(String, usize)>,
    /// Most frequent artist credits, at most ten
    pub top_artists: Vec<(String, usize)>,
    /// Percentage of detections carrying a Spotify id
    pub spotify_coverage: f64,
    pub needs_review: usize,
}

const TOP_LIMIT: usize = 10;

impl SessionSummary {
    pub fn is_aborted(&self) -> bool {
        self.state == SessionState::FatalAborted
    }

    pub fn statistics(&self) -> SessionStatistics {
        let total = self.detections.len();
        if total == 0 {
            return SessionStatistics {
                total_detections: 0,
                unique_songs: 0,
                unique_artists: 0,
                average_confidence: 0.0,
                confidence_std: 0.0,
                tracks_with_detections: 0,
                top_songs: Vec::new(),
                top_artists: Vec::new(),
                spotify_coverage: 0.0,
                needs_review: 0,
            };
        }

        let mut song_counts: HashMap<String, usize> = HashMap::new();
        let mut artist_counts: HashMap<String, usize> = HashMap::new();
        let mut artists: HashSet<&str> = HashSet::new();
        let mut tracks: HashSet<&str> = HashSet::new();
        let mut with_spotify = 0usize;
        let mut needs_review = 0usize;

        for detection in &self.detections {
            *song_counts.entry(detection.title().to_string()).or_default() += 1;
            *artist_counts.entry(detection.artist()).or_default() += 1;
            artists.extend(
                detection
                    .track
                    .artists
                    .iter()
                    .map(|a| a.as_str())
                    .filter(|a| !a.is_empty()),
            );
            tracks.insert(detection.track_id.as_str());
            if detection.track.spotify_id.is_some() {
                with_spotify += 1;
            }
            if detection.needs_review() {
                needs_review += 1;
            }
        }

        let mean = self.detections.iter().map(|d| d.confidence).sum::<f64>() / total as f64;
        let confidence_std = if total > 1 {
            let variance = self
                .detections
                .iter()
                .map(|d| (d.confidence - mean).powi(2))
                .sum::<f64>()
                / (total - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        SessionStatistics {
            total_detections: total,
            unique_songs: song_counts.len(),
            unique_artists: artists.len(),
            average_confidence: mean,
            confidence_std,
            tracks_with_detections: tracks.len(),
            top_songs: top_counts(song_counts),
            top_artists: top_counts(artist_counts),
            spotify_coverage: with_spotify as f64 / total as f64 * 100.0,
            needs_review,
        }
    }
}

/// Highest counts first, ties by name
fn top_counts(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(TOP_LIMIT);
    entries
}
