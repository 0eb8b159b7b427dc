//! Configuration for jnj-rec
//!
//! TOML file layout:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [recognition]
//! service = "acrcloud"        # or "audd"
//! segment_length_s = 30.0
//! overlap_s = 5.0
//! track_concurrency = 2
//!
//! [acrcloud]
//! host = "identify-us-west-2.acrcloud.com"
//! access_key = "..."
//! access_secret = "..."
//!
//! [audd]
//! api_token = "..."
//! ```
//!
//! Credentials resolve ENV → TOML; the environment wins when both are set.

use crate::models::PipelineParameters;
use crate::services::acrcloud_client::{self, AcrCloudBackend, AcrCloudCredentials};
use crate::services::audd_client::AuddBackend;
use crate::services::recognition_client::RecognitionBackend;
use jnj_common::config::{
    load_or_default, resolve_config_path, resolve_secret, LoggingConfig, CONFIG_ENV_VAR,
};
use jnj_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const ACRCLOUD_KEY_ENV: &str = "ACRCLOUD_ACCESS_KEY";
pub const ACRCLOUD_SECRET_ENV: &str = "ACRCLOUD_ACCESS_SECRET";
pub const ACRCLOUD_HOST_ENV: &str = "ACRCLOUD_HOST";
pub const AUDD_TOKEN_ENV: &str = "AUDD_API_TOKEN";

/// Recognition service selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    #[value(name = "acrcloud")]
    AcrCloud,
    #[value(name = "audd")]
    Audd,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::AcrCloud => f.write_str("acrcloud"),
            BackendKind::Audd => f.write_str("audd"),
        }
    }
}

/// `[recognition]` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default)]
    pub service: BackendKind,
    #[serde(flatten)]
    pub parameters: PipelineParameters,
}

/// `[acrcloud]` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AcrCloudConfig {
    pub host: Option<String>,
    pub access_key: Option<String>,
    pub access_secret: Option<String>,
}

/// `[audd]` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuddConfig {
    pub api_token: Option<String>,
}

/// Whole jnj-rec TOML file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub acrcloud: AcrCloudConfig,
    #[serde(default)]
    pub audd: AuddConfig,
}

impl TomlConfig {
    /// Load from the CLI path, `JNJ_CONFIG`, or the per-user file; compiled
    /// defaults when none exists
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        load_or_default(path.as_deref())
    }
}

/// Resolve ACRCloud credentials
///
/// **Priority:** ENV → TOML. The host falls back to the public default.
pub fn resolve_acrcloud_credentials(config: &AcrCloudConfig) -> Result<AcrCloudCredentials> {
    let access_key = resolve_secret(
        "ACRCloud access key",
        &[ACRCLOUD_KEY_ENV],
        config.access_key.as_deref(),
    );
    let access_secret = resolve_secret(
        "ACRCloud access secret",
        &[ACRCLOUD_SECRET_ENV],
        config.access_secret.as_deref(),
    );
    let host = resolve_secret("ACRCloud host", &[ACRCLOUD_HOST_ENV], config.host.as_deref())
        .unwrap_or_else(|| acrcloud_client::DEFAULT_HOST.to_string());

    match (access_key, access_secret) {
        (Some(access_key), Some(access_secret)) => Ok(AcrCloudCredentials {
            host,
            access_key,
            access_secret,
        }),
        _ => Err(Error::Config(format!(
            "ACRCloud credentials not configured. Please configure using one of:\n\
             1. Environment: {}=... and {}=...\n\
             2. TOML config: [acrcloud] access_key = \"...\" and access_secret = \"...\"",
            ACRCLOUD_KEY_ENV, ACRCLOUD_SECRET_ENV
        ))),
    }
}

/// Resolve the AudD API token
///
/// **Priority:** ENV → TOML
pub fn resolve_audd_token(config: &AuddConfig) -> Result<String> {
    resolve_secret("AudD API token", &[AUDD_TOKEN_ENV], config.api_token.as_deref()).ok_or_else(
        || {
            Error::Config(format!(
                "AudD API token not configured. Please configure using one of:\n\
                 1. Environment: {}=...\n\
                 2. TOML config: [audd] api_token = \"...\"",
                AUDD_TOKEN_ENV
            ))
        },
    )
}

/// Build the backend for `kind` from resolved credentials
pub fn build_backend(kind: BackendKind, config: &TomlConfig) -> Result<Arc<dyn RecognitionBackend>> {
    let backend: Arc<dyn RecognitionBackend> = match kind {
        BackendKind::AcrCloud => {
            let credentials = resolve_acrcloud_credentials(&config.acrcloud)?;
            Arc::new(AcrCloudBackend::new(credentials).map_err(|e| Error::Config(e.to_string()))?)
        }
        BackendKind::Audd => {
            let token = resolve_audd_token(&config.audd)?;
            Arc::new(AuddBackend::new(token).map_err(|e| Error::Config(e.to_string()))?)
        }
    };
    tracing::info!(backend = %kind, "Recognition backend configured");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_credential_env() {
        for name in [ACRCLOUD_KEY_ENV, ACRCLOUD_SECRET_ENV, ACRCLOUD_HOST_ENV, AUDD_TOKEN_ENV] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_full_config_parses() {
        let config: TomlConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"

            [recognition]
            service = "audd"
            segment_length_s = 20.0
            overlap_s = 4.0
            segment_concurrency = 3

            [audd]
            api_token = "token"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.recognition.service, BackendKind::Audd);
        assert_eq!(config.recognition.parameters.segment_length_s, 20.0);
        assert_eq!(config.recognition.parameters.overlap_s, 4.0);
        assert_eq!(config.recognition.parameters.segment_concurrency, 3);
        assert_eq!(config.recognition.parameters.track_concurrency, 2);
        assert_eq!(config.audd.api_token.as_deref(), Some("token"));
        assert!(config.acrcloud.access_key.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.recognition.service, BackendKind::AcrCloud);
        assert_eq!(config.recognition.parameters, PipelineParameters::default());
    }

    #[test]
    fn test_unknown_service_rejected() {
        let parsed: std::result::Result<TomlConfig, _> =
            toml::from_str("[recognition]\nservice = \"shazam\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::AcrCloud.to_string(), "acrcloud");
        assert_eq!(BackendKind::Audd.to_string(), "audd");
    }

    #[test]
    #[serial]
    fn test_acrcloud_credentials_from_toml() {
        clear_credential_env();
        let config = AcrCloudConfig {
            host: None,
            access_key: Some("key".to_string()),
            access_secret: Some("secret".to_string()),
        };

        let creds = resolve_acrcloud_credentials(&config).unwrap();
        assert_eq!(creds.access_key, "key");
        assert_eq!(creds.access_secret, "secret");
        assert_eq!(creds.host, acrcloud_client::DEFAULT_HOST);
    }

    #[test]
    #[serial]
    fn test_acrcloud_env_overrides_toml() {
        clear_credential_env();
        std::env::set_var(ACRCLOUD_KEY_ENV, "env-key");
        std::env::set_var(ACRCLOUD_HOST_ENV, "identify-eu-west-1.acrcloud.com");
        let config = AcrCloudConfig {
            host: Some("ignored.example".to_string()),
            access_key: Some("toml-key".to_string()),
            access_secret: Some("toml-secret".to_string()),
        };

        let creds = resolve_acrcloud_credentials(&config).unwrap();
        clear_credential_env();

        assert_eq!(creds.access_key, "env-key");
        assert_eq!(creds.access_secret, "toml-secret");
        assert_eq!(creds.host, "identify-eu-west-1.acrcloud.com");
    }

    #[test]
    #[serial]
    fn test_acrcloud_missing_secret_is_config_error() {
        clear_credential_env();
        let config = AcrCloudConfig {
            access_key: Some("key".to_string()),
            access_secret: Some("   ".to_string()),
            ..Default::default()
        };

        match resolve_acrcloud_credentials(&config) {
            Err(Error::Config(msg)) => assert!(msg.contains(ACRCLOUD_SECRET_ENV)),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_audd_token_resolution() {
        clear_credential_env();
        assert!(matches!(
            resolve_audd_token(&AuddConfig::default()),
            Err(Error::Config(_))
        ));

        std::env::set_var(AUDD_TOKEN_ENV, "env-token");
        let token = resolve_audd_token(&AuddConfig {
            api_token: Some("toml-token".to_string()),
        });
        clear_credential_env();
        assert_eq!(token.unwrap(), "env-token");
    }

    #[test]
    #[serial]
    fn test_build_backend_names() {
        clear_credential_env();
        let mut config = TomlConfig::default();
        config.acrcloud.access_key = Some("key".to_string());
        config.acrcloud.access_secret = Some("secret".to_string());
        config.audd.api_token = Some("token".to_string());

        assert_eq!(build_backend(BackendKind::AcrCloud, &config).unwrap().name(), "acrcloud");
        assert_eq!(build_backend(BackendKind::Audd, &config).unwrap().name(), "audd");
    }

    #[test]
    #[serial]
    fn test_build_backend_without_credentials_fails() {
        clear_credential_env();
        assert!(build_backend(BackendKind::Audd, &TomlConfig::default()).is_err());
    }
}
