//! Anki Voice - hands-free voice review for Anki flashcards
//!
//! This library drives a spoken review session:
//! - Reads each card aloud and listens for the answer
//! - Classifies utterances into grades, questions, and voice commands
//! - Grades free answers through a semantic grader and submits the result
//! - Arbitrates the audio path so playback and recognition never overlap
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Presentation (console, HTTP)            │
//! │          snapshots out  │  button events in          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Session driver                      │
//! │   State machine  │  Audio arbiter  │  Retry policy   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          anki-voice server (HTTP)                    │
//! │   Anki reviewer  │  AnkiConnect  │  LLM grader       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod card;
pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
