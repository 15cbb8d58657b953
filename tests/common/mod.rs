//! Shared test utilities
//!
//! In-memory collaborators for driving a whole session: a scheduler that
//! serves a scripted card queue, a grader with a configurable delay, and
//! speech fakes that count how many of them hold the audio path at once.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use anki_voice::card::{Card, CardId, DeckStats, Ease};
use anki_voice::remote::{
    CardService, FollowUpRequest, Grading, GradingRequest, GradingService, Health,
};
use anki_voice::session::{SessionHandle, SessionServices, Snapshot, spawn_session};
use anki_voice::voice::{
    AudioArbiter, AudioHardware, AudioRoute, SpeechCompletion, SpeechOutcome, SpeechRequest,
    SpeechSynthesizer, Transcript, TranscriptSource,
};
use anki_voice::{Config, Error, Result};

/// Upper bound for any wait; virtual under a paused clock
const WAIT: Duration = Duration::from_secs(120);

/// Build a card with plain-text sides
#[must_use]
pub fn card(id: i64, front: &str, back: &str) -> Card {
    Card::from_html(CardId(id), &format!("<div>{front}</div>"), &format!("<div>{back}</div>"))
}

/// A healthy backend report
#[must_use]
pub fn healthy() -> Health {
    Health {
        server: "ok".to_string(),
        anki_addon: "ok".to_string(),
        ankiconnect: "ok".to_string(),
        anki_running: "ok".to_string(),
    }
}

// -- scheduler ----------------------------------------------------------------

/// Reviewer over a fixed queue: the front card is current until answered
pub struct ScriptedCards {
    queue: Mutex<VecDeque<Card>>,
    answered: Mutex<Vec<Card>>,
    submit_results: Mutex<VecDeque<Result<()>>>,
    grades: Mutex<Vec<(CardId, Ease)>>,
    suspended: Mutex<Vec<CardId>>,
    reveals: AtomicUsize,
    decks: Vec<String>,
    current_deck: Mutex<String>,
    health: Mutex<Result<Health>>,
}

impl ScriptedCards {
    #[must_use]
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self {
        Self {
            queue: Mutex::new(cards.into_iter().collect()),
            answered: Mutex::new(Vec::new()),
            submit_results: Mutex::new(VecDeque::new()),
            grades: Mutex::new(Vec::new()),
            suspended: Mutex::new(Vec::new()),
            reveals: AtomicUsize::new(0),
            decks: vec!["Default".to_string(), "Spanish".to_string()],
            current_deck: Mutex::new("Default".to_string()),
            health: Mutex::new(Ok(healthy())),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new([])
    }

    /// Results handed out, in order, by the next grade submissions
    #[must_use]
    pub fn with_submit_results(self, results: impl IntoIterator<Item = Result<()>>) -> Self {
        self.submit_results.lock().unwrap().extend(results);
        self
    }

    #[must_use]
    pub fn with_health(self, health: Result<Health>) -> Self {
        *self.health.lock().unwrap() = health;
        self
    }

    pub fn grades(&self) -> Vec<(CardId, Ease)> {
        self.grades.lock().unwrap().clone()
    }

    pub fn suspended(&self) -> Vec<CardId> {
        self.suspended.lock().unwrap().clone()
    }

    pub fn reveals(&self) -> usize {
        self.reveals.load(Ordering::SeqCst)
    }

    pub fn current_deck(&self) -> String {
        self.current_deck.lock().unwrap().clone()
    }

    fn has_deck(&self, name: &str) -> bool {
        self.decks.iter().any(|deck| deck == name)
    }
}

#[async_trait]
impl CardService for ScriptedCards {
    async fn fetch_current_card(&self) -> Result<Option<Card>> {
        Ok(self.queue.lock().unwrap().front().cloned())
    }

    async fn reveal_answer(&self) -> Result<()> {
        self.reveals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_grade(&self, card_id: CardId, ease: Ease) -> Result<()> {
        if let Some(result) = self.submit_results.lock().unwrap().pop_front() {
            result?;
        }

        let mut queue = self.queue.lock().unwrap();
        if queue.front().is_some_and(|card| card.id == card_id) {
            let answered = queue.pop_front();
            self.answered.lock().unwrap().extend(answered);
        }
        self.grades.lock().unwrap().push((card_id, ease));
        Ok(())
    }

    async fn undo_last_grade(&self) -> Result<()> {
        let card = self
            .answered
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::Backend {
                status: 400,
                message: "nothing to undo".to_string(),
            })?;
        self.grades.lock().unwrap().pop();
        self.queue.lock().unwrap().push_front(card);
        Ok(())
    }

    async fn list_decks(&self) -> Result<Vec<String>> {
        Ok(self.decks.clone())
    }

    async fn switch_deck(&self, name: &str) -> Result<()> {
        if !self.has_deck(name) {
            return Err(Error::NotFound(format!("deck {name}")));
        }
        *self.current_deck.lock().unwrap() = name.to_string();
        Ok(())
    }

    async fn deck_stats(&self, name: &str) -> Result<DeckStats> {
        if !self.has_deck(name) {
            return Err(Error::NotFound(format!("deck {name}")));
        }
        Ok(DeckStats { new: 5, due: 12 })
    }

    async fn suspend_card(&self, card_id: CardId) -> Result<()> {
        let mut queue = self.queue.lock().unwrap();
        queue.retain(|card| card.id != card_id);
        self.suspended.lock().unwrap().push(card_id);
        Ok(())
    }

    async fn health(&self) -> Result<Health> {
        match &*self.health.lock().unwrap() {
            Ok(health) => Ok(health.clone()),
            Err(e) => Err(Error::Backend {
                status: 503,
                message: e.to_string(),
            }),
        }
    }
}

// -- grader -------------------------------------------------------------------

/// Grader that answers after a fixed delay
pub struct ScriptedGrader {
    delay: Duration,
    grading: Grading,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedGrader {
    #[must_use]
    pub fn new(delay: Duration, explanation: &str) -> Self {
        Self {
            delay,
            grading: Grading {
                explanation: explanation.to_string(),
                ..Grading::default()
            },
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, "That is correct.")
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion rather than being dropped
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    async fn work(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GradingService for ScriptedGrader {
    async fn grade_with_explanation(&self, _request: &GradingRequest) -> Result<Grading> {
        self.work().await;
        Ok(self.grading.clone())
    }

    async fn answer_follow_up(&self, request: &FollowUpRequest) -> Result<String> {
        self.work().await;
        Ok(format!("About {}: see the reference.", request.question))
    }
}

// -- audio --------------------------------------------------------------------

/// Counts speech fakes currently holding the audio path
#[derive(Debug, Default)]
pub struct Holders {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl Holders {
    fn enter(self: &Arc<Self>) -> HolderGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        HolderGuard(Arc::clone(self))
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous holders seen
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

pub struct HolderGuard(Arc<Holders>);

impl Drop for HolderGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Synthesizer whose playback takes a fixed time
pub struct FakeSynth {
    holders: Arc<Holders>,
    duration: Duration,
    spoken: Mutex<Vec<String>>,
    playback: Mutex<Option<JoinHandle<()>>>,
    holding: Arc<Mutex<Option<HolderGuard>>>,
}

impl FakeSynth {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechSynthesizer for FakeSynth {
    fn speak(&self, request: &SpeechRequest, done: SpeechCompletion) -> Result<()> {
        self.stop();
        *self.holding.lock().unwrap() = Some(self.holders.enter());
        self.spoken.lock().unwrap().push(request.text.clone());

        let duration = self.duration;
        let holding = Arc::clone(&self.holding);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            holding.lock().unwrap().take();
            done.finish(SpeechOutcome::Finished);
        });

        *self.playback.lock().unwrap() = Some(handle);
        Ok(())
    }

    // An aborted task is only dropped on its next poll; release now
    fn stop(&self) {
        if let Some(handle) = self.playback.lock().unwrap().take() {
            handle.abort();
        }
        self.holding.lock().unwrap().take();
    }
}

/// Recognizer that says one scripted line per stream, then stays quiet
pub struct FakeRecognizer {
    holders: Arc<Holders>,
    script: Mutex<VecDeque<String>>,
    stream: Mutex<Option<(HolderGuard, JoinHandle<()>)>>,
    starts: AtomicUsize,
}

impl FakeRecognizer {
    pub fn say(&self, text: &str) {
        self.script.lock().unwrap().push_back(text.to_string());
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Kill the current stream the way a crashed recognizer would
    pub fn crash(&self) {
        self.stop();
    }
}

impl TranscriptSource for FakeRecognizer {
    fn start(&self, _language: Option<&str>) -> Result<watch::Receiver<Transcript>> {
        self.stop();
        self.starts.fetch_add(1, Ordering::SeqCst);
        let guard = self.holders.enter();

        let (tx, rx) = watch::channel(Transcript::default());
        let line = self.script.lock().unwrap().pop_front();
        let handle = tokio::spawn(async move {
            if let Some(text) = line {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = tx.send(Transcript {
                    text,
                    is_final: true,
                });
            }
            std::future::pending::<()>().await;
            drop(tx);
        });

        *self.stream.lock().unwrap() = Some((guard, handle));
        Ok(rx)
    }

    fn stop(&self) {
        if let Some((guard, handle)) = self.stream.lock().unwrap().take() {
            handle.abort();
            drop(guard);
        }
    }

    fn is_alive(&self) -> bool {
        self.stream.lock().unwrap().is_some()
    }
}

/// Phone routing without a headset; the platform may move output to the earpiece
#[derive(Debug)]
pub struct FakeRoutes {
    output: Mutex<AudioRoute>,
}

impl FakeRoutes {
    pub fn output(&self) -> AudioRoute {
        *self.output.lock().unwrap()
    }

    /// What the platform does on a call or proximity event
    pub fn switch_to_earpiece(&self) {
        *self.output.lock().unwrap() = AudioRoute::Earpiece;
    }
}

impl AudioHardware for FakeRoutes {
    fn current_output(&self) -> AudioRoute {
        self.output()
    }

    fn connected_headset(&self) -> Option<AudioRoute> {
        None
    }

    fn set_output(&self, route: AudioRoute) -> Result<()> {
        *self.output.lock().unwrap() = route;
        Ok(())
    }

    fn set_speaker_override(&self, enabled: bool) -> Result<()> {
        if enabled {
            *self.output.lock().unwrap() = AudioRoute::Speaker;
        }
        Ok(())
    }

    fn set_input(&self, _route: AudioRoute) -> Result<()> {
        Ok(())
    }
}

// -- harness ------------------------------------------------------------------

/// A running session over the fakes
pub struct Harness {
    pub session: SessionHandle,
    pub driver: JoinHandle<()>,
    pub cards: Arc<ScriptedCards>,
    pub grader: Arc<ScriptedGrader>,
    pub synth: Arc<FakeSynth>,
    pub recognizer: Arc<FakeRecognizer>,
    pub routes: Arc<FakeRoutes>,
    pub holders: Arc<Holders>,
}

impl Harness {
    /// Spawn a session with default configuration
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(cards: ScriptedCards, grader: ScriptedGrader) -> Self {
        let holders = Arc::new(Holders::default());
        let synth = Arc::new(FakeSynth {
            holders: Arc::clone(&holders),
            duration: Duration::from_millis(500),
            spoken: Mutex::new(Vec::new()),
            playback: Mutex::new(None),
            holding: Arc::new(Mutex::new(None)),
        });
        let recognizer = Arc::new(FakeRecognizer {
            holders: Arc::clone(&holders),
            script: Mutex::new(VecDeque::new()),
            stream: Mutex::new(None),
            starts: AtomicUsize::new(0),
        });
        let routes = Arc::new(FakeRoutes {
            output: Mutex::new(AudioRoute::Speaker),
        });
        let cards = Arc::new(cards);
        let grader = Arc::new(grader);

        let config = Config::default();
        let arbiter = AudioArbiter::new(
            synth.clone(),
            recognizer.clone(),
            routes.clone(),
            config.voice.quiet_fence,
        );
        let services = SessionServices {
            cards: cards.clone(),
            grader: grader.clone(),
            arbiter,
        };
        let (session, driver) = spawn_session(services, &config);

        Self {
            session,
            driver,
            cards,
            grader,
            synth,
            recognizer,
            routes,
            holders,
        }
    }

    /// Wait until a published snapshot satisfies `pred`
    pub async fn wait_for(&self, what: &str, pred: impl FnMut(&Snapshot) -> bool) -> Snapshot {
        let mut snapshots = self.session.subscribe();
        match tokio::time::timeout(WAIT, snapshots.wait_for(pred)).await {
            Ok(Ok(snapshot)) => (*snapshot).clone(),
            Ok(Err(_)) => panic!("session closed while waiting for {what}"),
            Err(_) => panic!(
                "timed out waiting for {what}; last snapshot: {:?}",
                self.session.snapshot()
            ),
        }
    }

    /// Wait until `check` holds, polling on a short tick
    pub async fn wait_until(&self, what: &str, mut check: impl FnMut() -> bool) {
        let poll = async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(WAIT, poll).await.is_err() {
            panic!("timed out waiting for {what}");
        }
    }

    /// Shut the driver down and wait for it to release the audio path
    pub async fn close(self) {
        self.session.shutdown().await.unwrap();
        self.driver.await.unwrap();
    }
}
