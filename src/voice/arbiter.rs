//! Audio resource arbiter
//!
//! Owns the single audio path shared by playback and capture. At most one
//! [`AudioPhase`] is active: entering `Speaking` closes the listening gate and
//! tears down recognition before playback starts, and entering `Listening`
//! waits out the quiet fence after the last playback so echo is not captured.
//!
//! The arbiter is shared as `Arc<tokio::sync::Mutex<AudioArbiter>>`; whoever
//! holds the lock owns the audio path for the duration of its command sequence.
//! Route changes reported while the lock is held are handled by the holder
//! through the [`AudioArbiter::route_signal`] notifier.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::io::{
    AudioHardware, AudioRoute, SpeechCompletion, SpeechOutcome, SpeechRequest, SpeechSynthesizer,
    Transcript, TranscriptSource,
};
use crate::{Error, Result};

/// Which side of the audio path is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPhase {
    #[default]
    Idle,
    Speaking,
    Listening,
}

/// Exclusive owner of the speaker/microphone path
pub struct AudioArbiter {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcripts: Arc<dyn TranscriptSource>,
    hardware: Arc<dyn AudioHardware>,
    quiet_fence: Duration,
    phase: AudioPhase,
    gate_open: bool,
    last_playback_end: Option<Instant>,
    listen_language: Option<String>,
    stream: Option<watch::Receiver<Transcript>>,
    route_changes: Arc<Notify>,
}

impl std::fmt::Debug for AudioArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArbiter")
            .field("phase", &self.phase)
            .field("gate_open", &self.gate_open)
            .field("quiet_fence", &self.quiet_fence)
            .finish_non_exhaustive()
    }
}

impl AudioArbiter {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcripts: Arc<dyn TranscriptSource>,
        hardware: Arc<dyn AudioHardware>,
        quiet_fence: Duration,
    ) -> Self {
        Self {
            synthesizer,
            transcripts,
            hardware,
            quiet_fence,
            phase: AudioPhase::Idle,
            gate_open: false,
            last_playback_end: None,
            listen_language: None,
            stream: None,
            route_changes: Arc::new(Notify::new()),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> AudioPhase {
        self.phase
    }

    /// Notifier for route changes, usable without holding the arbiter
    ///
    /// A speaking holder re-checks the output route when notified.
    #[must_use]
    pub fn route_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.route_changes)
    }

    /// Revoke the microphone and prepare the output route for playback
    pub fn enter_speaking(&mut self) {
        self.gate_open = false;
        if self.phase == AudioPhase::Listening {
            self.transcripts.stop();
            self.stream = None;
        }

        select_output_route(self.hardware.as_ref());

        self.phase = AudioPhase::Speaking;
        tracing::debug!(phase = ?self.phase, "audio phase changed");
    }

    /// Speak one request, suspending until playback ends or `token` fires
    ///
    /// Playback that cannot be started is logged and reported as finished so
    /// the session keeps moving. The phase returns to `Idle` afterwards.
    pub async fn speak(
        &mut self,
        request: &SpeechRequest,
        token: &CancellationToken,
    ) -> SpeechOutcome {
        self.enter_speaking();

        let (done, mut rx) = SpeechCompletion::new();
        if let Err(e) = self.synthesizer.speak(request, done) {
            tracing::warn!(error = %e, "speech playback failed to start");
            self.finish_playback();
            return SpeechOutcome::Finished;
        }

        let route_changes = Arc::clone(&self.route_changes);
        let outcome = loop {
            tokio::select! {
                () = token.cancelled() => {
                    self.synthesizer.stop();
                    break SpeechOutcome::Interrupted;
                }
                () = route_changes.notified() => {
                    if self.force_route_recovery() {
                        tracing::info!("audio route recovered during playback");
                    }
                }
                result = &mut rx => break result.unwrap_or(SpeechOutcome::Interrupted),
            }
        };

        self.finish_playback();
        tracing::trace!(?outcome, chars = request.text.len(), "playback ended");
        outcome
    }

    fn finish_playback(&mut self) {
        self.last_playback_end = Some(Instant::now());
        self.phase = AudioPhase::Idle;
        tracing::debug!(phase = ?self.phase, "audio phase changed");
    }

    /// Grant the microphone and start a fresh recognition stream
    ///
    /// When already listening this only checks the stream is alive. Otherwise
    /// any playback is cut, the quiet fence after the last playback is waited
    /// out, and the input route is selected before the gate opens.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `token` fires during the quiet fence, or an STT
    /// error if the recognizer cannot be started
    pub async fn enter_listening(
        &mut self,
        language: Option<&str>,
        token: &CancellationToken,
    ) -> Result<watch::Receiver<Transcript>> {
        if self.phase == AudioPhase::Listening && self.gate_open {
            if let Some(fresh) = self.assert_listening_alive() {
                return Ok(fresh);
            }
            if let Some(stream) = &self.stream {
                return Ok(stream.clone());
            }
        }

        if self.phase == AudioPhase::Speaking {
            self.synthesizer.stop();
            self.finish_playback();
        }

        if let Some(ended) = self.last_playback_end {
            let ready = ended + self.quiet_fence;
            tokio::select! {
                () = token.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep_until(ready) => {}
            }
        }

        select_input_route(self.hardware.as_ref());

        self.gate_open = true;
        self.listen_language = language.map(ToString::to_string);
        let stream = match self.transcripts.start(language) {
            Ok(stream) => stream,
            Err(e) => {
                self.gate_open = false;
                self.phase = AudioPhase::Idle;
                return Err(e);
            }
        };
        self.stream = Some(stream.clone());
        self.phase = AudioPhase::Listening;
        tracing::debug!(phase = ?self.phase, "audio phase changed");

        Ok(stream)
    }

    /// Restart recognition if it died while the gate is open
    ///
    /// Returns the replacement stream when a restart happened. The quiet fence
    /// is not re-run.
    pub fn assert_listening_alive(&mut self) -> Option<watch::Receiver<Transcript>> {
        if self.phase != AudioPhase::Listening || !self.gate_open || self.transcripts.is_alive() {
            return None;
        }

        tracing::warn!("recognizer died while listening, restarting");
        match self.transcripts.start(self.listen_language.as_deref()) {
            Ok(stream) => {
                self.stream = Some(stream.clone());
                Some(stream)
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognizer restart failed");
                None
            }
        }
    }

    /// Re-apply the loudspeaker override after an unexpected route change
    ///
    /// Returns whether an override was applied.
    #[must_use]
    pub fn force_route_recovery(&self) -> bool {
        recover_route(self.hardware.as_ref())
    }

    /// Release the audio path entirely
    pub fn enter_idle(&mut self) {
        self.gate_open = false;
        match self.phase {
            AudioPhase::Listening => {
                self.transcripts.stop();
                self.stream = None;
            }
            AudioPhase::Speaking => {
                self.synthesizer.stop();
                self.last_playback_end = Some(Instant::now());
            }
            AudioPhase::Idle => {}
        }

        if self.phase != AudioPhase::Idle {
            self.phase = AudioPhase::Idle;
            tracing::debug!(phase = ?self.phase, "audio phase changed");
        }
    }
}

/// Connected headset route, ignoring anything the platform misreports as one
fn headset(hardware: &dyn AudioHardware) -> Option<AudioRoute> {
    hardware.connected_headset().filter(|route| route.is_headset())
}

/// Prefer a connected headset, otherwise force the loudspeaker
fn select_output_route(hardware: &dyn AudioHardware) {
    if let Some(headset) = headset(hardware) {
        best_effort("disable speaker override", hardware.set_speaker_override(false));
        best_effort("select headset output", hardware.set_output(headset));
    } else {
        best_effort("enable speaker override", hardware.set_speaker_override(true));
        best_effort("select speaker output", hardware.set_output(AudioRoute::Speaker));
    }
}

fn select_input_route(hardware: &dyn AudioHardware) {
    let input = headset(hardware).unwrap_or(AudioRoute::BuiltInMic);
    best_effort("select input", hardware.set_input(input));
}

/// Safety net for the platform switching playback to the earpiece
///
/// Does nothing while a headset is connected or the output is already usable.
/// Returns whether an override was applied.
fn recover_route(hardware: &dyn AudioHardware) -> bool {
    if headset(hardware).is_some() {
        return false;
    }

    let current = hardware.current_output();
    if current != AudioRoute::Earpiece {
        return false;
    }

    tracing::warn!(route = ?current, "unsuitable output route, forcing speaker");
    best_effort("enable speaker override", hardware.set_speaker_override(true));
    true
}

fn best_effort(what: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "{what} failed, continuing");
    }
}
