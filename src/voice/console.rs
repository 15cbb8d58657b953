//! Terminal stand-ins for speech hardware
//!
//! Speech is printed and "played" for a duration proportional to its length.
//! Typed lines become transcripts, streamed word by word as partial results
//! with the last word marked final, but only while the microphone is open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::io::{
    AudioHardware, AudioRoute, SpeechCompletion, SpeechOutcome, SpeechRequest, SpeechSynthesizer,
    Transcript, TranscriptSource,
};
use crate::{Error, Result};

/// Simulated speaking rate
const PER_WORD: Duration = Duration::from_millis(120);

/// Delay between streamed words of a typed line
const WORD_INTERVAL: Duration = Duration::from_millis(80);

/// Prints speech to stdout
#[derive(Debug, Default)]
pub struct ConsoleSynthesizer {
    playback: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&self, request: &SpeechRequest, done: SpeechCompletion) -> Result<()> {
        let lang = request.language.as_deref().unwrap_or("default");
        println!("🔊 [{lang}] {}", request.text);

        let words = u32::try_from(request.text.split_whitespace().count()).unwrap_or(u32::MAX);
        let duration = PER_WORD.saturating_mul(words);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            done.finish(SpeechOutcome::Finished);
        });

        let mut playback = self
            .playback
            .lock()
            .map_err(|_| Error::Tts("playback state poisoned".to_string()))?;
        if let Some(previous) = playback.replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    fn stop(&self) {
        // Aborting drops the completion, which resolves it as interrupted
        if let Ok(mut playback) = self.playback.lock()
            && let Some(handle) = playback.take()
        {
            handle.abort();
        }
    }
}

/// Turns stdin lines into streamed transcripts
#[derive(Debug)]
pub struct ConsoleTranscriptSource {
    open: Arc<AtomicBool>,
    stdin_open: Arc<AtomicBool>,
    current: Arc<Mutex<Option<watch::Sender<Transcript>>>>,
}

impl ConsoleTranscriptSource {
    /// Start the stdin reader; must be called inside a tokio runtime
    #[must_use]
    pub fn spawn() -> Arc<Self> {
        let source = Arc::new(Self {
            open: Arc::new(AtomicBool::new(false)),
            stdin_open: Arc::new(AtomicBool::new(true)),
            current: Arc::new(Mutex::new(None)),
        });

        let open = Arc::clone(&source.open);
        let stdin_open = Arc::clone(&source.stdin_open);
        let current = Arc::clone(&source.current);

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if !open.load(Ordering::SeqCst) {
                            println!("(microphone closed, ignored)");
                            continue;
                        }
                        stream_line(&line, &current).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            stdin_open.store(false, Ordering::SeqCst);
            tracing::debug!("stdin closed");
        });

        source
    }
}

async fn stream_line(line: &str, current: &Mutex<Option<watch::Sender<Transcript>>>) {
    let words: Vec<&str> = line.split_whitespace().collect();
    let mut text = String::new();

    for (i, word) in words.iter().enumerate() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);

        let transcript = Transcript {
            text: text.clone(),
            is_final: i + 1 == words.len(),
        };

        let sent = current
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|tx| tx.send(transcript).is_ok()))
            .unwrap_or(false);
        if !sent {
            return;
        }

        tokio::time::sleep(WORD_INTERVAL).await;
    }
}

impl TranscriptSource for ConsoleTranscriptSource {
    fn start(&self, language: Option<&str>) -> Result<watch::Receiver<Transcript>> {
        if !self.stdin_open.load(Ordering::SeqCst) {
            return Err(Error::Stt("stdin closed".to_string()));
        }

        let (tx, rx) = watch::channel(Transcript::default());
        *self
            .current
            .lock()
            .map_err(|_| Error::Stt("transcript state poisoned".to_string()))? = Some(tx);
        self.open.store(true, Ordering::SeqCst);

        println!("🎤 listening ({})", language.unwrap_or("default"));
        Ok(rx)
    }

    fn stop(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
    }

    fn is_alive(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.stdin_open.load(Ordering::SeqCst)
    }
}

/// Fixed loudspeaker routing with no headset
#[derive(Debug, Default)]
pub struct ConsoleHardware;

impl AudioHardware for ConsoleHardware {
    fn current_output(&self) -> AudioRoute {
        AudioRoute::Speaker
    }

    fn connected_headset(&self) -> Option<AudioRoute> {
        None
    }

    fn set_output(&self, route: AudioRoute) -> Result<()> {
        tracing::trace!(?route, "output route");
        Ok(())
    }

    fn set_speaker_override(&self, enabled: bool) -> Result<()> {
        tracing::trace!(enabled, "speaker override");
        Ok(())
    }

    fn set_input(&self, route: AudioRoute) -> Result<()> {
        tracing::trace!(?route, "input route");
        Ok(())
    }
}
