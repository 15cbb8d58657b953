//! Speech endpoint detection
//!
//! Decides from a live partial transcript when the user has stopped speaking.
//! A recognizer's own "final" flag fires too early on short answers and never
//! on run-on speech, so it only counts when combined with a silence floor.
//!
//! Finalization rules, checked on each polling tick:
//! - the hard cap elapsed, regardless of content
//! - a final result, after the minimum listen time, followed by short silence
//! - terminal punctuation followed by moderate silence
//! - a non-empty transcript followed by the primary silence threshold

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::arbiter::AudioArbiter;
use super::io::Transcript;
use crate::config::EndpointConfig;
use crate::{Error, Result};

/// Why an utterance was considered complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointReason {
    Silence,
    FinalResult,
    Punctuation,
    HardCap,
}

/// A completed utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub text: String,
    pub reason: EndpointReason,
}

/// Live transcript accumulated during one listening phase
#[derive(Debug, Clone)]
pub struct PendingUtterance {
    pub text: String,
    pub is_final_hint: bool,
    pub last_change: Instant,
    pub listen_start: Instant,
}

impl PendingUtterance {
    fn new(now: Instant) -> Self {
        Self {
            text: String::new(),
            is_final_hint: false,
            last_change: now,
            listen_start: now,
        }
    }
}

/// Pure endpointing state machine, driven by timestamps from the caller
#[derive(Debug, Clone)]
pub struct EndpointDetector {
    policy: EndpointConfig,
    pending: PendingUtterance,
}

impl EndpointDetector {
    #[must_use]
    pub fn new(policy: EndpointConfig, now: Instant) -> Self {
        Self {
            policy,
            pending: PendingUtterance::new(now),
        }
    }

    #[must_use]
    pub const fn pending(&self) -> &PendingUtterance {
        &self.pending
    }

    /// Start over for a new listening phase
    pub fn reset(&mut self, now: Instant) {
        self.pending = PendingUtterance::new(now);
    }

    /// Feed the transcript observed at `now`
    pub fn observe(&mut self, now: Instant, transcript: &Transcript) -> Option<Finalized> {
        if transcript.text != self.pending.text {
            self.pending.text.clone_from(&transcript.text);
            self.pending.last_change = now;
        }
        self.pending.is_final_hint = transcript.is_final;

        let reason = self.decide(now)?;
        let text = self.pending.text.trim().to_string();
        self.reset(now);

        Some(Finalized { text, reason })
    }

    fn decide(&self, now: Instant) -> Option<EndpointReason> {
        let p = &self.policy;
        let elapsed = now.saturating_duration_since(self.pending.listen_start);
        let silence = now.saturating_duration_since(self.pending.last_change);
        let text = self.pending.text.trim();

        if elapsed >= p.hard_cap {
            return Some(EndpointReason::HardCap);
        }

        if text.is_empty() {
            return None;
        }

        if self.pending.is_final_hint && elapsed > p.final_min_listen && silence > p.final_silence {
            return Some(EndpointReason::FinalResult);
        }

        if ends_with_terminal_punctuation(text) && silence > p.punctuation_silence {
            return Some(EndpointReason::Punctuation);
        }

        if silence >= p.silence {
            return Some(EndpointReason::Silence);
        }

        None
    }
}

fn ends_with_terminal_punctuation(text: &str) -> bool {
    text.ends_with(['.', '?', '!', '…', '。', '？', '！'])
}

/// Listen until the user finishes one utterance
///
/// Takes the microphone through the arbiter, polls the transcript on the
/// configured tick, restarts a dead recognizer, and releases the audio path
/// when done. `on_partial` sees each new partial transcript. Returns `None`
/// when the hard cap passes without any speech.
///
/// # Errors
///
/// Returns `Cancelled` when `token` fires, or an STT error if recognition
/// cannot be started
pub async fn capture_utterance(
    arbiter: &mut AudioArbiter,
    language: Option<&str>,
    policy: &EndpointConfig,
    token: &CancellationToken,
    mut on_partial: impl FnMut(&str),
) -> Result<Option<String>> {
    let mut stream = arbiter.enter_listening(language, token).await?;
    let mut detector = EndpointDetector::new(*policy, Instant::now());

    let mut ticker = tokio::time::interval(policy.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => {
                arbiter.enter_idle();
                return Err(Error::Cancelled);
            }
            _ = ticker.tick() => {}
        }

        if let Some(fresh) = arbiter.assert_listening_alive() {
            stream = fresh;
        }

        let transcript = stream.borrow_and_update().clone();
        if transcript.text != detector.pending().text {
            on_partial(&transcript.text);
        }

        if let Some(done) = detector.observe(Instant::now(), &transcript) {
            arbiter.enter_idle();
            tracing::debug!(reason = ?done.reason, chars = done.text.len(), "utterance finalized");
            return Ok((!done.text.is_empty()).then_some(done.text));
        }
    }
}
