//! TOML configuration file loading
//!
//! Supports `~/.config/anki-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AnkiVoiceConfigFile {
    /// Backend and presentation API settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Voice interaction settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech endpoint detection thresholds
    #[serde(default)]
    pub endpoint: EndpointFileConfig,

    /// Remote call timeouts and delays
    #[serde(default)]
    pub remote: RemoteFileConfig,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Base URL of the card/grading backend
    pub url: Option<String>,

    /// Presentation API port
    pub api_port: Option<u16>,

    /// Serve the presentation API alongside the session
    pub api_enabled: Option<bool>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Interaction language ("en" or "es")
    pub locale: Option<String>,

    /// Delay between playback end and microphone start
    pub quiet_fence_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndpointFileConfig {
    pub poll_interval_ms: Option<u64>,
    pub silence_ms: Option<u64>,
    pub final_min_listen_ms: Option<u64>,
    pub final_silence_ms: Option<u64>,
    pub punctuation_silence_ms: Option<u64>,
    pub hard_cap_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteFileConfig {
    pub card_timeout_ms: Option<u64>,
    pub grading_timeout_ms: Option<u64>,
    pub retry_delay_ms: Option<u64>,
    pub reviewer_settle_ms: Option<u64>,
    pub same_card_delay_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AnkiVoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> AnkiVoiceConfigFile {
    let Some(path) = config_file_path() else {
        return AnkiVoiceConfigFile::default();
    };

    load_config_file_at(&path)
}

/// Load a TOML config file from an explicit path, falling back to defaults
#[must_use]
pub fn load_config_file_at(path: &Path) -> AnkiVoiceConfigFile {
    if !path.exists() {
        return AnkiVoiceConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AnkiVoiceConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AnkiVoiceConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/anki-voice/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("anki-voice").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file_at(&dir.path().join("nope.toml"));
        assert!(fc.server.url.is_none());
        assert!(fc.endpoint.hard_cap_ms.is_none());
    }

    #[test]
    fn partial_file_overlays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
url = "http://10.0.0.5:8000"

[endpoint]
silence_ms = 1500
"#,
        )
        .unwrap();

        let fc = load_config_file_at(&path);
        assert_eq!(fc.server.url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(fc.endpoint.silence_ms, Some(1500));
        assert!(fc.remote.retry_delay_ms.is_none());
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = [not valid").unwrap();

        let fc = load_config_file_at(&path);
        assert!(fc.server.url.is_none());
    }
}
