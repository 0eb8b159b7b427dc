//! AudD recognition API backend
//!
//! AudD returns no match score; a hit is reported with confidence 1.0.

use crate::error::BackendError;
use crate::models::TrackMatch;
use crate::services::recognition_client::{BackendResponse, RecognitionBackend};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const AUDD_BASE_URL: &str = "https://api.audd.io/";
const USER_AGENT: &str = concat!("jnj-rec/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct AuddResponse {
    status: String,
    result: Option<AuddResult>,
    error: Option<AuddError>,
}

#[derive(Debug, Deserialize)]
struct AuddError {
    error_code: i64,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct AuddResult {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    release_date: Option<String>,
    spotify: Option<AuddSpotify>,
}

#[derive(Debug, Deserialize)]
struct AuddSpotify {
    id: Option<String>,
    duration_ms: Option<u64>,
    external_ids: Option<AuddExternalIds>,
}

#[derive(Debug, Deserialize)]
struct AuddExternalIds {
    isrc: Option<String>,
}

/// AudD backend
pub struct AuddBackend {
    http_client: reqwest::Client,
    api_token: String,
    base_url: String,
}

impl AuddBackend {
    pub fn new(api_token: String) -> Result<Self, BackendError> {
        Self::with_base_url(api_token, AUDD_BASE_URL.to_string())
    }

    pub fn with_base_url(api_token: String, base_url: String) -> Result<Self, BackendError> {
        if api_token.trim().is_empty() {
            return Err(BackendError::Config("AudD API token is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            api_token,
            base_url,
        })
    }
}

#[async_trait]
impl RecognitionBackend for AuddBackend {
    fn name(&self) -> &str {
        "audd"
    }

    async fn identify(&self, audio: &[u8]) -> Result<BackendResponse, BackendError> {
        let file = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("sample.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .text("api_token", self.api_token.clone())
            .text("return", "spotify")
            .part("file", file);

        tracing::debug!(bytes = audio.len(), "Querying AudD API");

        let response = self
            .http_client
            .post(&self.base_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_response(status, &body)
    }
}

/// Classify an HTTP status and AudD body into a response or error
pub fn parse_response(http_status: u16, body: &str) -> Result<BackendResponse, BackendError> {
    match http_status {
        200..=299 => {}
        401 | 403 => return Err(BackendError::Auth(format!("HTTP {}", http_status))),
        429 => return Err(BackendError::RateLimited(format!("HTTP {}", http_status))),
        500..=599 => return Err(BackendError::Server(http_status, body.chars().take(200).collect())),
        _ => return Err(BackendError::Rejected(format!("HTTP {}", http_status))),
    }

    let raw: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    let response: AuddResponse =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::Parse(e.to_string()))?;

    if response.status != "success" {
        let (code, message) = response
            .error
            .map(|e| (e.error_code, e.error_message))
            .unwrap_or((0, format!("status {}", response.status)));
        let detail = format!("AudD error {}: {}", code, message);
        return Err(match code {
            900 => BackendError::Auth(detail),
            901 | 902 => BackendError::RateLimited(detail),
            _ => BackendError::Rejected(detail),
        });
    }

    let Some(result) = response.result else {
        return Ok(BackendResponse::no_match(raw));
    };

    let spotify = result.spotify;
    let track = TrackMatch {
        title: result.title.unwrap_or_else(|| "Unknown".to_string()),
        artists: result.artist.into_iter().filter(|a| !a.is_empty()).collect(),
        album: result.album.filter(|a| !a.is_empty()),
        duration_ms: spotify.as_ref().and_then(|s| s.duration_ms),
        spotify_id: spotify.as_ref().and_then(|s| s.id.clone()),
        isrc: spotify
            .and_then(|s| s.external_ids)
            .and_then(|ids| ids.isrc),
        genres: Vec::new(),
        release_date: result.release_date.filter(|d| !d.is_empty()),
    };

    Ok(BackendResponse::matched(track, 1.0, raw))
}
