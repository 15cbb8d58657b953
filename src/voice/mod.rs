//! Voice interaction module
//!
//! Handles utterance classification, speech endpointing, and exclusive
//! ownership of the audio path. Speech synthesis and recognition themselves
//! sit behind the traits in [`io`].

mod arbiter;
pub mod console;
mod endpoint;
pub mod intent;
mod io;

pub use arbiter::{AudioArbiter, AudioPhase};
pub use endpoint::{
    EndpointDetector, EndpointReason, Finalized, PendingUtterance, capture_utterance,
};
pub use intent::{Intent, IntentClassifier, Locale, VoiceCommand, classify, recognize_command};
pub use io::{
    AudioHardware, AudioRoute, SpeechCompletion, SpeechOutcome, SpeechRequest, SpeechSynthesizer,
    Transcript, TranscriptSource,
};
