//! Configuration management for anki-voice

pub mod file;

use std::time::Duration;

use crate::Result;
use crate::voice::intent::Locale;

use file::AnkiVoiceConfigFile;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_API_PORT: u16 = 8787;

/// anki-voice configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Card and grading backend
    pub server: ServerConfig,

    /// Presentation API server
    pub api_server: ApiServerConfig,

    /// Voice interaction
    pub voice: VoiceConfig,

    /// Speech endpoint detection
    pub endpoint: EndpointConfig,

    /// Remote call policy
    pub remote: RemoteConfig,
}

/// Card and grading backend configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Serve the presentation API while a session runs
    pub enabled: bool,

    /// Port to listen on
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_API_PORT,
        }
    }
}

/// Voice interaction configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Interaction language for prompts and classification
    pub locale: Locale,

    /// Enforced delay between playback end and capture start
    pub quiet_fence: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: Locale::En,
            quiet_fence: Duration::from_millis(300),
        }
    }
}

/// Speech endpoint detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Transcript polling tick
    pub poll_interval: Duration,
    /// Silence that ends a non-empty utterance on its own
    pub silence: Duration,
    /// Minimum listening time before a final result is trusted
    pub final_min_listen: Duration,
    /// Silence required after a final result
    pub final_silence: Duration,
    /// Silence required after terminal punctuation
    pub punctuation_silence: Duration,
    /// Upper bound on a single listening turn
    pub hard_cap: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            silence: Duration::from_millis(2000),
            final_min_listen: Duration::from_millis(1200),
            final_silence: Duration::from_millis(800),
            punctuation_silence: Duration::from_millis(1200),
            hard_cap: Duration::from_secs(15),
        }
    }
}

/// Timeouts and delays for calls to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Per-attempt timeout for card operations
    pub card_timeout: Duration,
    /// Per-attempt timeout for grading and follow-up questions
    pub grading_timeout: Duration,
    /// Pause before retrying a non-timeout failure
    pub retry_delay: Duration,
    /// Pause before re-submitting a grade the reviewer was not ready for
    pub reviewer_settle: Duration,
    /// Pause before re-fetching when the backend returns the card just graded
    pub same_card_delay: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            card_timeout: Duration::from_secs(4),
            grading_timeout: Duration::from_secs(45),
            retry_delay: Duration::from_millis(500),
            reviewer_settle: Duration::from_millis(300),
            same_card_delay: Duration::from_millis(700),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an environment override holds an invalid value
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with overrides from `env`
    ///
    /// # Errors
    ///
    /// Returns error if the locale is not supported
    pub fn resolve(fc: AnkiVoiceConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let server = ServerConfig {
            url: env("ANKI_VOICE_SERVER_URL")
                .or(fc.server.url)
                .map_or(defaults.server.url, |u| u.trim_end_matches('/').to_string()),
        };

        let api_server = ApiServerConfig {
            enabled: fc.server.api_enabled.unwrap_or(defaults.api_server.enabled),
            port: env("ANKI_VOICE_API_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.api_port)
                .unwrap_or(defaults.api_server.port),
        };

        let locale = match env("ANKI_VOICE_LOCALE").or(fc.voice.locale) {
            Some(tag) => tag.parse()?,
            None => defaults.voice.locale,
        };

        let voice = VoiceConfig {
            locale,
            quiet_fence: ms_or(fc.voice.quiet_fence_ms, defaults.voice.quiet_fence),
        };

        let e = fc.endpoint;
        let d = defaults.endpoint;
        let endpoint = EndpointConfig {
            poll_interval: ms_or(e.poll_interval_ms.filter(|ms| *ms > 0), d.poll_interval),
            silence: ms_or(e.silence_ms, d.silence),
            final_min_listen: ms_or(e.final_min_listen_ms, d.final_min_listen),
            final_silence: ms_or(e.final_silence_ms, d.final_silence),
            punctuation_silence: ms_or(e.punctuation_silence_ms, d.punctuation_silence),
            hard_cap: ms_or(e.hard_cap_ms, d.hard_cap),
        };

        let r = fc.remote;
        let d = defaults.remote;
        let remote = RemoteConfig {
            card_timeout: ms_or(r.card_timeout_ms, d.card_timeout),
            grading_timeout: ms_or(r.grading_timeout_ms, d.grading_timeout),
            retry_delay: ms_or(r.retry_delay_ms, d.retry_delay),
            reviewer_settle: ms_or(r.reviewer_settle_ms, d.reviewer_settle),
            same_card_delay: ms_or(r.same_card_delay_ms, d.same_card_delay),
        };

        tracing::debug!(url = %server.url, locale = %voice.locale, "resolved configuration");

        Ok(Self {
            server,
            api_server,
            voice,
            endpoint,
            remote,
        })
    }
}

fn ms_or(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::resolve(AnkiVoiceConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.server.url, "http://127.0.0.1:8000");
        assert_eq!(config.api_server.port, 8787);
        assert!(config.api_server.enabled);
        assert_eq!(config.voice.locale, Locale::En);
        assert_eq!(config.voice.quiet_fence, Duration::from_millis(300));
        assert_eq!(config.endpoint, EndpointConfig::default());
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn env_beats_file() {
        let mut fc = AnkiVoiceConfigFile::default();
        fc.server.url = Some("http://file:8000".to_string());
        fc.server.api_port = Some(9000);
        fc.voice.locale = Some("en".to_string());

        let config = Config::resolve(
            fc,
            env_from(&[
                ("ANKI_VOICE_SERVER_URL", "http://env:8000/"),
                ("ANKI_VOICE_LOCALE", "es-MX"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.url, "http://env:8000");
        assert_eq!(config.api_server.port, 9000);
        assert_eq!(config.voice.locale, Locale::Es);
    }

    #[test]
    fn file_overrides_thresholds() {
        let mut fc = AnkiVoiceConfigFile::default();
        fc.endpoint.silence_ms = Some(1500);
        fc.remote.grading_timeout_ms = Some(10_000);

        let config = Config::resolve(fc, env_from(&[])).unwrap();
        assert_eq!(config.endpoint.silence, Duration::from_millis(1500));
        assert_eq!(config.endpoint.hard_cap, Duration::from_secs(15));
        assert_eq!(config.remote.grading_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_poll_interval_uses_default() {
        let mut fc = AnkiVoiceConfigFile::default();
        fc.endpoint.poll_interval_ms = Some(0);

        let config = Config::resolve(fc, env_from(&[])).unwrap();
        assert_eq!(config.endpoint.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn unsupported_locale_is_an_error() {
        let result = Config::resolve(
            AnkiVoiceConfigFile::default(),
            env_from(&[("ANKI_VOICE_LOCALE", "fr")]),
        );
        assert!(result.is_err());
    }
}
