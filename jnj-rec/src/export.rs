//! Session result export (JSON, CSV, playlist)

use crate::models::{MergedDetection, SessionSummary};
use jnj_common::time::{format_timestamp, ms_to_seconds};
use jnj_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Full session summary as pretty JSON
    Json,
    /// One row per merged detection
    Csv,
    /// Unique songs with their occurrences, best average confidence first
    Playlist,
}

const CSV_COLUMNS: &[&str] = &[
    "track_id",
    "timestamp_start",
    "timestamp_end",
    "start_seconds",
    "end_seconds",
    "title",
    "artists",
    "album",
    "confidence",
    "supporting_segments",
    "backend",
    "spotify_id",
    "isrc",
    "genres",
    "release_date",
    "needs_review",
];

/// One CSV row; field order matches `CSV_COLUMNS`
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    track_id: &'a str,
    timestamp_start: String,
    timestamp_end: String,
    start_seconds: String,
    end_seconds: String,
    title: &'a str,
    artists: String,
    album: &'a str,
    confidence: String,
    supporting_segments: usize,
    backend: &'a str,
    spotify_id: &'a str,
    isrc: &'a str,
    genres: String,
    release_date: &'a str,
    needs_review: bool,
}

impl<'a> From<&'a MergedDetection> for CsvRow<'a> {
    fn from(d: &'a MergedDetection) -> Self {
        Self {
            track_id: &d.track_id,
            timestamp_start: format_timestamp(d.start_ms),
            timestamp_end: format_timestamp(d.end_ms),
            start_seconds: format!("{:.3}", ms_to_seconds(d.start_ms)),
            end_seconds: format!("{:.3}", ms_to_seconds(d.end_ms)),
            title: &d.track.title,
            artists: d.artist(),
            album: d.track.album.as_deref().unwrap_or_default(),
            confidence: format!("{:.3}", d.confidence),
            supporting_segments: d.supporting_count,
            backend: &d.backend,
            spotify_id: d.track.spotify_id.as_deref().unwrap_or_default(),
            isrc: d.track.isrc.as_deref().unwrap_or_default(),
            genres: d.track.genres.join(", "),
            release_date: d.track.release_date.as_deref().unwrap_or_default(),
            needs_review: d.needs_review(),
        }
    }
}

fn csv_error(err: csv::Error) -> Error {
    Error::Internal(format!("Write CSV failed: {}", err))
}

/// CSV with a header row and one row per merged detection
pub fn to_csv(summary: &SessionSummary) -> Result<String> {
    // Header written explicitly so an empty session still gets one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).map_err(csv_error)?;
    for detection in &summary.detections {
        writer.serialize(CsvRow::from(detection)).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("Flush CSV failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV is not UTF-8: {}", e)))
}

/// One appearance of a song in the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistOccurrence {
    pub track_id: String,
    pub timestamp: String,
    pub start_ms: u64,
    pub confidence: f64,
}

/// One unique song across the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub spotify_id: Option<String>,
    pub isrc: Option<String>,
    pub occurrences: Vec<PlaylistOccurrence>,
    pub average_confidence: f64,
}

/// Unique songs (by exact title and artist list), best average confidence first
pub fn playlist(summary: &SessionSummary) -> Vec<PlaylistEntry> {
    let mut index: HashMap<(String, Vec<String>), usize> = HashMap::new();
    let mut entries: Vec<PlaylistEntry> = Vec::new();

    for detection in &summary.detections {
        let key = (detection.track.title.clone(), detection.track.artists.clone());
        let position = *index.entry(key).or_insert_with(|| {
            entries.push(PlaylistEntry {
                title: detection.track.title.clone(),
                artists: detection.track.artists.clone(),
                album: detection.track.album.clone(),
                spotify_id: detection.track.spotify_id.clone(),
                isrc: detection.track.isrc.clone(),
                occurrences: Vec::new(),
                average_confidence: 0.0,
            });
            entries.len() - 1
        });

        let entry = &mut entries[position];
        if entry.spotify_id.is_none() {
            entry.spotify_id = detection.track.spotify_id.clone();
        }
        entry.occurrences.push(PlaylistOccurrence {
            track_id: detection.track_id.clone(),
            timestamp: format_timestamp(detection.start_ms),
            start_ms: detection.start_ms,
            confidence: detection.confidence,
        });
    }

    for entry in &mut entries {
        let total: f64 = entry.occurrences.iter().map(|o| o.confidence).sum();
        entry.average_confidence = total / entry.occurrences.len() as f64;
    }

    // Stable sort keeps first-appearance order among equal averages
    entries.sort_by(|a, b| b.average_confidence.total_cmp(&a.average_confidence));
    entries
}

pub fn to_playlist_json(summary: &SessionSummary) -> Result<String> {
    serde_json::to_string_pretty(&playlist(summary))
        .map_err(|e| Error::Internal(format!("Serialize playlist failed: {}", e)))
}

/// Render `summary` in `format`
pub fn render(summary: &SessionSummary, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(summary),
        ExportFormat::Csv => to_csv(summary),
        ExportFormat::Playlist => to_playlist_json(summary),
    }
}

/// Write `summary` to `path`, creating parent directories as needed
pub fn write_export(summary: &SessionSummary, format: ExportFormat, path: &Path) -> Result<()> {
    let content = render(summary, format)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;

    tracing::info!(
        path = %path.display(),
        format = ?format,
        detections = summary.detections.len(),
        "Exported session results"
    );
    Ok(())
}
