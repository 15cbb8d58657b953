//! Error types for anki-voice

use thiserror::Error;

/// Result type alias for anki-voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a voice review session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio route or hardware error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Collaborator returned a non-success status
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// The reviewer is not in a state that accepts answers
    #[error("reviewer not ready: {0}")]
    ReviewerNotReady(String),

    /// Resource not found (deck, note)
    #[error("not found: {0}")]
    NotFound(String),

    /// Ease outside the 1..=4 range
    #[error("invalid ease: {0}")]
    InvalidEase(u8),

    /// A single attempt exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The operation was superseded before it completed
    #[error("cancelled")]
    Cancelled,

    /// The session driver has shut down
    #[error("session closed")]
    SessionClosed,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether a failed remote call is worth one more attempt
    ///
    /// Business errors (reviewer state, missing decks, bad input) are final;
    /// connection problems and server-side failures are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Backend { status, message } => {
                crate::remote::retry::is_recoverable(*status, message)
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether this error came from an attempt exceeding its deadline
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
