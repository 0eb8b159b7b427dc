//! ACRCloud identify API backend
//!
//! `POST https://{host}/v1/identify` with a multipart sample, signed with
//! HMAC-SHA1 over the access key and a Unix timestamp.

use crate::error::BackendError;
use crate::models::TrackMatch;
use crate::services::recognition_client::{BackendResponse, RecognitionBackend};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "identify-us-west-2.acrcloud.com";
const IDENTIFY_PATH: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";
const USER_AGENT: &str = concat!("jnj-rec/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha1 = Hmac<Sha1>;

/// ACRCloud project credentials
#[derive(Clone)]
pub struct AcrCloudCredentials {
    pub host: String,
    pub access_key: String,
    pub access_secret: String,
}

impl std::fmt::Debug for AcrCloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcrCloudCredentials")
            .field("host", &self.host)
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AcrResponse {
    status: AcrStatus,
    #[serde(default)]
    metadata: Option<AcrMetadata>,
}

#[derive(Debug, Deserialize)]
struct AcrStatus {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct AcrMetadata {
    #[serde(default)]
    music: Vec<AcrMusic>,
}

#[derive(Debug, Deserialize)]
struct AcrMusic {
    title: Option<String>,
    #[serde(default)]
    artists: Vec<AcrNamed>,
    album: Option<AcrNamed>,
    duration_ms: Option<u64>,
    score: Option<f64>, // 0-100
    #[serde(default)]
    genres: Vec<AcrNamed>,
    release_date: Option<String>,
    external_ids: Option<AcrExternalIds>,
    external_metadata: Option<AcrExternalMetadata>,
}

#[derive(Debug, Deserialize)]
struct AcrNamed {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AcrExternalIds {
    /// String or list of strings depending on the catalogue
    isrc: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AcrExternalMetadata {
    spotify: Option<AcrSpotify>,
}

#[derive(Debug, Deserialize)]
struct AcrSpotify {
    track: Option<AcrId>,
}

#[derive(Debug, Deserialize)]
struct AcrId {
    id: Option<String>,
}

/// ACRCloud backend
pub struct AcrCloudBackend {
    http_client: reqwest::Client,
    credentials: AcrCloudCredentials,
}

impl AcrCloudBackend {
    pub fn new(credentials: AcrCloudCredentials) -> Result<Self, BackendError> {
        if credentials.host.trim().is_empty() {
            return Err(BackendError::Config("ACRCloud host is empty".to_string()));
        }
        if credentials.access_key.trim().is_empty() || credentials.access_secret.trim().is_empty() {
            return Err(BackendError::Config(
                "ACRCloud access key and secret are required".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            credentials,
        })
    }

    fn endpoint(&self) -> String {
        format!("https://{}{}", self.credentials.host.trim(), IDENTIFY_PATH)
    }
}

#[async_trait]
impl RecognitionBackend for AcrCloudBackend {
    fn name(&self) -> &str {
        "acrcloud"
    }

    async fn identify(&self, audio: &[u8]) -> Result<BackendResponse, BackendError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            &self.credentials.access_key,
            &self.credentials.access_secret,
            &timestamp,
        )?;

        let sample = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("sample.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("sample", sample)
            .text("access_key", self.credentials.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", signature)
            .text("sample_bytes", audio.len().to_string())
            .text("timestamp", timestamp);

        tracing::debug!(bytes = audio.len(), "Querying ACRCloud identify API");

        let response = self
            .http_client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_response(status, &body)
    }
}

/// base64(HMAC-SHA1(secret, "POST\n/v1/identify\n{key}\naudio\n1\n{timestamp}"))
pub fn sign(access_key: &str, access_secret: &str, timestamp: &str) -> Result<String, BackendError> {
    let string_to_sign = format!(
        "POST\n{}\n{}\n{}\n{}\n{}",
        IDENTIFY_PATH, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    );

    let mut mac = HmacSha1::new_from_slice(access_secret.as_bytes())
        .map_err(|e| BackendError::Config(format!("Invalid ACRCloud secret: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Classify an HTTP status and ACRCloud body into a response or error
pub fn parse_response(http_status: u16, body: &str) -> Result<BackendResponse, BackendError> {
    match http_status {
        200..=299 => {}
        401 | 403 => {
            return Err(BackendError::Auth(format!(
                "HTTP {}: {}",
                http_status,
                truncate(body)
            )))
        }
        429 => return Err(BackendError::RateLimited(format!("HTTP {}", http_status))),
        500..=599 => return Err(BackendError::Server(http_status, truncate(body))),
        _ => {
            return Err(BackendError::Rejected(format!(
                "HTTP {}: {}",
                http_status,
                truncate(body)
            )))
        }
    }

    let raw: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BackendError::Parse(e.to_string()))?;
    let response: AcrResponse =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::Parse(e.to_string()))?;

    let code = response.status.code;
    let msg = response.status.msg;
    match code {
        0 => {}
        1001 => return Ok(BackendResponse::no_match(raw)),
        3001 | 3014 | 3015 => {
            return Err(BackendError::Auth(format!("ACRCloud code {}: {}", code, msg)))
        }
        3003 | 3013 => {
            return Err(BackendError::RateLimited(format!(
                "ACRCloud code {}: {}",
                code, msg
            )))
        }
        _ => {
            return Err(BackendError::Rejected(format!(
                "ACRCloud code {}: {}",
                code, msg
            )))
        }
    }

    // First entry is the best match
    let Some(music) = response
        .metadata
        .and_then(|metadata| metadata.music.into_iter().next())
    else {
        return Ok(BackendResponse::no_match(raw));
    };

    let confidence = music.score.unwrap_or(0.0) / 100.0;
    let track = TrackMatch {
        title: music.title.unwrap_or_else(|| "Unknown".to_string()),
        artists: music
            .artists
            .into_iter()
            .map(|a| a.name)
            .filter(|name| !name.is_empty())
            .collect(),
        album: music.album.map(|a| a.name).filter(|name| !name.is_empty()),
        duration_ms: music.duration_ms,
        spotify_id: music
            .external_metadata
            .and_then(|m| m.spotify)
            .and_then(|s| s.track)
            .and_then(|t| t.id),
        isrc: music.external_ids.and_then(|ids| ids.isrc).and_then(first_string),
        genres: music
            .genres
            .into_iter()
            .map(|g| g.name)
            .filter(|name| !name.is_empty())
            .collect(),
        release_date: music.release_date.filter(|d| !d.is_empty()),
    };

    Ok(BackendResponse::matched(track, confidence, raw))
}

fn first_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => items.into_iter().find_map(first_string),
        _ => None,
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH_BODY: &str = r#"{
        "status": {"code": 0, "msg": "Success", "version": "1.0"},
        "metadata": {
            "music": [{
                "title": "Song Y",
                "artists": [{"name": "Artist X"}, {"name": "Guest"}],
                "album": {"name": "Album Z"},
                "duration_ms": 215000,
                "score": 92,
                "genres": [{"name": "Tango"}],
                "release_date": "1998-03-01",
                "external_ids": {"isrc": "USABC9800001"},
                "external_metadata": {"spotify": {"track": {"id": "sp123"}}}
            }, {
                "title": "Other",
                "artists": [{"name": "Nobody"}],
                "score": 40
            }]
        }
    }"#;

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign("key", "secret", "1700000000").unwrap();
        let b = sign("key", "secret", "1700000000").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sign("key", "secret", "1700000001").unwrap());
        // HMAC-SHA1 digest is 20 bytes: 28 base64 characters
        assert_eq!(a.len(), 28);
    }

    #[test]
    fn test_parse_match_takes_first_entry() {
        let response = parse_response(200, MATCH_BODY).unwrap();
        let track = response.track.unwrap();

        assert_eq!(track.title, "Song Y");
        assert_eq!(track.artists, vec!["Artist X", "Guest"]);
        assert_eq!(track.album.as_deref(), Some("Album Z"));
        assert_eq!(track.duration_ms, Some(215_000));
        assert_eq!(track.spotify_id.as_deref(), Some("sp123"));
        assert_eq!(track.isrc.as_deref(), Some("USABC9800001"));
        assert_eq!(track.genres, vec!["Tango"]);
        assert_eq!(track.release_date.as_deref(), Some("1998-03-01"));
        assert!((response.confidence - 0.92).abs() < 1e-9);
        assert_eq!(response.raw["status"]["code"], 0);
    }

    #[test]
    fn test_parse_isrc_list() {
        let body = r#"{"status": {"code": 0, "msg": "Success"},
            "metadata": {"music": [{"title": "T", "score": 100,
                "external_ids": {"isrc": ["GB0000000001", "GB0000000002"]}}]}}"#;
        let track = parse_response(200, body).unwrap().track.unwrap();
        assert_eq!(track.isrc.as_deref(), Some("GB0000000001"));
        assert!(track.artists.is_empty());
    }

    #[test]
    fn test_no_result_code() {
        let body = r#"{"status": {"code": 1001, "msg": "No result"}}"#;
        let response = parse_response(200, body).unwrap();
        assert!(response.track.is_none());
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn test_empty_music_list_is_no_match() {
        let body = r#"{"status": {"code": 0, "msg": "Success"}, "metadata": {"music": []}}"#;
        assert!(parse_response(200, body).unwrap().track.is_none());
    }

    #[test]
    fn test_status_code_classification() {
        let body = |code: i64| format!(r#"{{"status": {{"code": {}, "msg": "x"}}}}"#, code);

        for code in [3001, 3014, 3015] {
            assert!(parse_response(200, &body(code)).unwrap_err().is_fatal());
        }
        for code in [3003, 3013] {
            let err = parse_response(200, &body(code)).unwrap_err();
            assert!(matches!(err, BackendError::RateLimited(_)));
            assert!(err.is_retryable());
        }
        for code in [2004, 2005, 9999] {
            let err = parse_response(200, &body(code)).unwrap_err();
            assert!(matches!(err, BackendError::Rejected(_)));
        }
    }

    #[test]
    fn test_http_status_classification() {
        assert!(matches!(
            parse_response(401, "denied"),
            Err(BackendError::Auth(_))
        ));
        assert!(matches!(
            parse_response(429, ""),
            Err(BackendError::RateLimited(_))
        ));
        assert!(matches!(
            parse_response(503, "down"),
            Err(BackendError::Server(503, _))
        ));
        assert!(matches!(
            parse_response(400, "bad"),
            Err(BackendError::Rejected(_))
        ));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_response(200, "<html>"),
            Err(BackendError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = AcrCloudBackend::new(AcrCloudCredentials {
            host: DEFAULT_HOST.to_string(),
            access_key: String::new(),
            access_secret: "s".to_string(),
        });
        assert!(matches!(result, Err(BackendError::Config(_))));
    }
}
