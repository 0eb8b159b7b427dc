//! Raw and merged detection models

use crate::models::segment::Segment;
use jnj_common::time::format_range;
use serde::{Deserialize, Serialize};

/// Track metadata returned by a recognition backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMatch {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Recording length reported by the backend
    pub duration_ms: Option<u64>,
    pub spotify_id: Option<String>,
    pub isrc: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub release_date: Option<String>,
}

impl TrackMatch {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artists: vec![artist.into()],
            ..Default::default()
        }
    }

    /// Artists joined for display ("A, B")
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }
}

/// Result of recognizing one segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    pub segment: Segment,
    /// `None` on no-match
    pub track: Option<TrackMatch>,
    /// Backend score normalized to 0.0-1.0 (0.0 on no-match)
    pub confidence: f64,
    /// Backend identifier ("acrcloud", "audd", ...)
    pub backend: String,
    /// Backend response body, kept opaque for auditing
    pub raw: Option<serde_json::Value>,
}

impl RawDetection {
    pub fn matched(
        segment: Segment,
        track: TrackMatch,
        confidence: f64,
        backend: impl Into<String>,
        raw: Option<serde_json::Value>,
    ) -> Self {
        Self {
            segment,
            track: Some(track),
            confidence,
            backend: backend.into(),
            raw,
        }
    }

    pub fn no_match(segment: Segment, backend: impl Into<String>) -> Self {
        Self {
            segment,
            track: None,
            confidence: 0.0,
            backend: backend.into(),
            raw: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.track.is_some()
    }
}

/// Near-duplicate note attached to a merged entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    /// Title of the neighbouring entry this one resembles
    pub similar_title: String,
    pub similar_artist: String,
    /// Normalized similarity of the two match keys
    pub similarity: f64,
}

/// One entry of a track's deduplicated, time-ordered track list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDetection {
    pub track_id: String,
    /// Canonical metadata (taken from the highest-confidence supporting hit)
    pub track: TrackMatch,
    /// Earliest start of the supporting segments
    pub start_ms: u64,
    /// Latest end of the supporting segments
    pub end_ms: u64,
    pub first_segment: usize,
    pub last_segment: usize,
    pub supporting_count: usize,
    /// Maximum confidence among supporting detections
    pub confidence: f64,
    pub backend: String,
    /// Set when a neighbouring entry has a suspiciously similar title/artist
    pub review: Option<ReviewFlag>,
}

impl MergedDetection {
    pub fn title(&self) -> &str {
        &self.track.title
    }

    pub fn artist(&self) -> String {
        self.track.artist_display()
    }

    pub fn needs_review(&self) -> bool {
        self.review.is_some()
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn time_label(&self) -> String {
        format_range(self.start_ms, self.end_ms)
    }
}
