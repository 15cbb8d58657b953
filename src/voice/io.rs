//! Seams to the speech and audio platform
//!
//! Speech synthesis and recognition are opaque services: the synthesizer
//! reports completion through a [`SpeechCompletion`], the recognizer publishes
//! its running transcript on a `watch` channel. Hardware route calls are
//! best-effort and may fail without consequence for the session.

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::Result;

/// Text to speak and the voice language to speak it in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    /// BCP 47 tag; `None` uses the platform default voice
    pub language: Option<String>,
}

impl SpeechRequest {
    #[must_use]
    pub fn new(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }
}

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Finished,
    Interrupted,
}

/// One-shot completion slot handed to the synthesizer with each request
///
/// `finish` consumes the slot, so a playback can be resolved at most once.
/// Dropping an unfinished slot resolves it as [`SpeechOutcome::Interrupted`].
#[derive(Debug)]
pub struct SpeechCompletion {
    waiter: Option<oneshot::Sender<SpeechOutcome>>,
}

impl SpeechCompletion {
    /// Create a slot and the receiver the caller awaits
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<SpeechOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { waiter: Some(tx) }, rx)
    }

    /// Resolve the playback
    pub fn finish(mut self, outcome: SpeechOutcome) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(outcome);
        }
    }
}

impl Drop for SpeechCompletion {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(SpeechOutcome::Interrupted);
        }
    }
}

/// Text-to-speech sink
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking; resolve `done` when playback ends
    ///
    /// # Errors
    ///
    /// Returns error if playback could not be started
    fn speak(&self, request: &SpeechRequest, done: SpeechCompletion) -> Result<()>;

    /// Cut off the current playback, resolving its completion as interrupted
    fn stop(&self);
}

/// Latest transcript of the live recognition stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// The recognizer considers this result final
    pub is_final: bool,
}

/// Speech-to-text source
pub trait TranscriptSource: Send + Sync {
    /// Start a fresh recognition stream
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer could not be started
    fn start(&self, language: Option<&str>) -> Result<watch::Receiver<Transcript>>;

    /// Stop the current stream, if any
    fn stop(&self);

    /// Whether the current stream is still delivering results
    fn is_alive(&self) -> bool;
}

/// Physical audio routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    Speaker,
    Earpiece,
    BuiltInMic,
    WiredHeadset,
    BluetoothHandsfree,
}

impl AudioRoute {
    /// Routes that carry both playback and capture on the user's head
    #[must_use]
    pub const fn is_headset(self) -> bool {
        matches!(self, Self::WiredHeadset | Self::BluetoothHandsfree)
    }
}

/// Audio routing controls
pub trait AudioHardware: Send + Sync {
    /// Route currently used for output
    fn current_output(&self) -> AudioRoute;

    /// A connected headset or handsfree device, if any
    fn connected_headset(&self) -> Option<AudioRoute>;

    /// Prefer the given output route
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejected the route
    fn set_output(&self, route: AudioRoute) -> Result<()>;

    /// Force playback to the loudspeaker instead of the earpiece receiver
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejected the override
    fn set_speaker_override(&self, enabled: bool) -> Result<()>;

    /// Prefer the given input route
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejected the route
    fn set_input(&self, route: AudioRoute) -> Result<()>;
}
