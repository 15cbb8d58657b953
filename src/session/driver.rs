//! Session driver
//!
//! A single task owns the [`SessionState`] and applies events one at a time.
//! Every accepted transition bumps the epoch and cancels the previous turn's
//! token, so speech, listening and remote calls issued for an older state
//! stop at their next suspension point and their results are dropped.
//!
//! Audio commands run in a turn task that holds the arbiter lock for the
//! whole turn. The lock is FIFO, so turns take the audio path in the order
//! their transitions were applied.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{
    Command, Event, PendingCall, RemoteEvent, RemoteRequest, SessionState, Snapshot, Transition,
    Utterance,
};
use super::transition::{Context, transition};
use crate::config::{Config, EndpointConfig};
use crate::remote::retry::RemoteCall;
use crate::remote::{CardService, GradingService, RetryPolicy, flows};
use crate::voice::{AudioArbiter, Locale, SpeechOutcome, capture_utterance};
use crate::{Error, Result};

/// Pending inputs before senders wait
const INPUT_BUFFER: usize = 64;

/// Collaborators a session drives
pub struct SessionServices {
    pub cards: Arc<dyn CardService>,
    pub grader: Arc<dyn GradingService>,
    pub arbiter: AudioArbiter,
}

enum Input {
    /// From the presentation layer; never stale
    Event(Event),
    /// Typed or externally recognized text, classified by the driver
    Utterance(String),
    /// From a turn or call issued at `epoch`
    Internal { epoch: u64, event: Event },
    Partial { epoch: u64, text: String },
    /// A call issued at `epoch` started another attempt
    CallProgress { epoch: u64 },
    RouteChanged,
    Shutdown,
}

/// Handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inputs: mpsc::Sender<Input>,
    snapshots: watch::Receiver<Snapshot>,
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(event) => f.debug_tuple("Event").field(&event.tag()).finish(),
            Self::Utterance(_) => f.write_str("Utterance"),
            Self::Internal { epoch, event } => f
                .debug_struct("Internal")
                .field("epoch", epoch)
                .field("event", &event.tag())
                .finish(),
            Self::Partial { epoch, .. } => f.debug_struct("Partial").field("epoch", epoch).finish(),
            Self::CallProgress { epoch } => {
                f.debug_struct("CallProgress").field("epoch", epoch).finish()
            }
            Self::RouteChanged => f.write_str("RouteChanged"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl SessionHandle {
    /// Deliver a user or lifecycle event
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped
    pub async fn send(&self, event: Event) -> Result<()> {
        self.push(Input::Event(event)).await
    }

    /// Deliver text as if it had been heard
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped
    pub async fn hear(&self, text: impl Into<String>) -> Result<()> {
        self.push(Input::Utterance(text.into())).await
    }

    /// Report that the platform changed the audio route
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped
    pub async fn route_changed(&self) -> Result<()> {
        self.push(Input::RouteChanged).await
    }

    /// Stop the driver and release the audio path
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has already stopped
    pub async fn shutdown(&self) -> Result<()> {
        self.push(Input::Shutdown).await
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that sees every published snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    async fn push(&self, input: Input) -> Result<()> {
        self.inputs
            .send(input)
            .await
            .map_err(|_| Error::SessionClosed)
    }
}

/// Start a session driver task
///
/// Must be called inside a tokio runtime.
#[must_use]
pub fn spawn_session(services: SessionServices, config: &Config) -> (SessionHandle, JoinHandle<()>) {
    let (inputs_tx, inputs_rx) = mpsc::channel(INPUT_BUFFER);
    let session_id = Uuid::new_v4();
    let (snapshot_tx, snapshot_rx) =
        watch::channel(Snapshot::capture(session_id, 0, &SessionState::Idle));

    let route_changes = services.arbiter.route_signal();
    let driver = Driver {
        session_id,
        state: SessionState::Idle,
        epoch: 0,
        turn: CancellationToken::new(),
        call: None,
        transcript: String::new(),
        message: None,
        ctx: Context {
            locale: config.voice.locale,
        },
        endpoint: config.endpoint,
        remote: Remote {
            cards: services.cards,
            grader: services.grader,
            card_policy: RetryPolicy::for_cards(&config.remote),
            grading_policy: RetryPolicy::for_grading(&config.remote),
            reviewer_settle: config.remote.reviewer_settle,
            same_card_delay: config.remote.same_card_delay,
        },
        arbiter: Arc::new(Mutex::new(services.arbiter)),
        route_changes,
        inputs: inputs_tx.downgrade(),
        snapshots: snapshot_tx,
    };

    tracing::info!(session_id = %session_id, locale = %config.voice.locale, "session started");
    let task = tokio::spawn(driver.run(inputs_rx));

    (
        SessionHandle {
            inputs: inputs_tx,
            snapshots: snapshot_rx,
        },
        task,
    )
}

struct Driver {
    session_id: Uuid,
    state: SessionState,
    epoch: u64,
    /// Parent token of everything issued by the current transition
    turn: CancellationToken,
    call: Option<RemoteCall>,
    transcript: String,
    message: Option<String>,
    ctx: Context,
    endpoint: EndpointConfig,
    remote: Remote,
    arbiter: Arc<Mutex<AudioArbiter>>,
    route_changes: Arc<Notify>,
    inputs: mpsc::WeakSender<Input>,
    snapshots: watch::Sender<Snapshot>,
}

impl Driver {
    async fn run(mut self, mut inputs: mpsc::Receiver<Input>) {
        while let Some(input) = inputs.recv().await {
            match input {
                Input::Event(event) => self.dispatch(event),
                Input::Utterance(text) => {
                    self.dispatch(Event::Heard(Utterance::classify(text, self.ctx.locale)));
                }
                Input::Internal { epoch, event } if epoch == self.epoch => self.dispatch(event),
                Input::Internal { epoch, event } => {
                    tracing::debug!(
                        epoch,
                        current = self.epoch,
                        event = ?event.tag(),
                        "dropping stale result"
                    );
                }
                Input::Partial { epoch, text } if epoch == self.epoch => {
                    self.transcript = text;
                    self.publish();
                }
                Input::Partial { .. } => {}
                Input::CallProgress { epoch } if epoch == self.epoch => self.publish(),
                Input::CallProgress { .. } => {}
                Input::RouteChanged => self.route_changed(),
                Input::Shutdown => break,
            }
        }

        self.turn.cancel();
        // Wait for the cancelled turn to give the audio path back
        self.arbiter.lock().await.enter_idle();
        tracing::info!(session_id = %self.session_id, "session stopped");
    }

    fn dispatch(&mut self, event: Event) {
        let from = self.state.tag();
        let tag = event.tag();

        let Some(Transition {
            next,
            commands,
            message,
        }) = transition(&self.state, &event, &self.ctx)
        else {
            tracing::debug!(state = ?from, event = ?tag, "event ignored");
            if matches!(event, Event::Remote(_)) && self.call.take().is_some() {
                self.publish();
            }
            return;
        };

        self.turn.cancel();
        self.turn = CancellationToken::new();
        self.epoch += 1;
        self.call = None;
        self.transcript.clear();

        tracing::info!(from = ?from, to = ?next.tag(), event = ?tag, epoch = self.epoch, "transition");
        self.state = next;
        self.message = message;

        let mut audio = Vec::new();
        for command in commands {
            match command {
                Command::Call(request) => self.start_call(request),
                other => audio.push(other),
            }
        }
        if !audio.is_empty() {
            self.start_turn(audio);
        }

        self.publish();
    }

    /// Recover the output route now, or hand it to the turn holding the audio path
    fn route_changed(&self) {
        let Ok(arbiter) = self.arbiter.try_lock() else {
            self.route_changes.notify_one();
            return;
        };
        if arbiter.force_route_recovery() {
            tracing::info!("audio route recovered to speaker");
        }
    }

    fn start_turn(&self, commands: Vec<Command>) {
        let Some(inputs) = self.inputs.upgrade() else {
            return;
        };

        let turn = Turn {
            arbiter: Arc::clone(&self.arbiter),
            commands,
            token: self.turn.clone(),
            epoch: self.epoch,
            locale: self.ctx.locale,
            endpoint: self.endpoint,
            inputs,
        };
        tokio::spawn(turn.run());
    }

    fn start_call(&mut self, request: RemoteRequest) {
        let Some(inputs) = self.inputs.upgrade() else {
            return;
        };

        let policy = match request {
            RemoteRequest::Grade(_) | RemoteRequest::FollowUp(_) => self.remote.grading_policy.clone(),
            _ => self.remote.card_policy.clone(),
        };
        let call = RemoteCall::new(request.kind(), self.epoch, &policy, &self.turn);
        tracing::debug!(kind = ?call.kind, epoch = call.epoch, "remote call issued");
        self.call = Some(call.clone());

        let remote = self.remote.clone();
        tokio::spawn(async move {
            let mut attempts = call.watch_attempts();
            let execute = remote.execute(request, &policy, &call);
            tokio::pin!(execute);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut execute => break outcome,
                    Ok(()) = attempts.changed() => {
                        let _ = inputs.send(Input::CallProgress { epoch: call.epoch }).await;
                    }
                }
            };
            let Some(event) = outcome else {
                return;
            };
            let _ = inputs
                .send(Input::Internal {
                    epoch: call.epoch,
                    event: Event::Remote(event),
                })
                .await;
        });
    }

    fn publish(&self) {
        let mut snapshot = Snapshot::capture(self.session_id, self.epoch, &self.state);
        snapshot.transcript.clone_from(&self.transcript);
        snapshot.message.clone_from(&self.message);
        snapshot.pending_call = self.call.as_ref().map(|call| PendingCall {
            kind: call.kind,
            attempts: call.attempts(),
        });
        self.snapshots.send_modify(|current| *current = snapshot);
    }
}

/// Audio commands of one transition
struct Turn {
    arbiter: Arc<Mutex<AudioArbiter>>,
    commands: Vec<Command>,
    token: CancellationToken,
    epoch: u64,
    locale: Locale,
    endpoint: EndpointConfig,
    inputs: mpsc::Sender<Input>,
}

impl Turn {
    async fn run(self) {
        let mut arbiter = tokio::select! {
            () = self.token.cancelled() => return,
            guard = self.arbiter.lock() => guard,
        };

        let mut spoke = false;
        for command in &self.commands {
            if self.token.is_cancelled() {
                return;
            }

            match command {
                Command::Speak(request) => {
                    let outcome = arbiter.speak(request, &self.token).await;
                    if self.token.is_cancelled() {
                        return;
                    }
                    if outcome == SpeechOutcome::Interrupted {
                        tracing::debug!("playback interrupted by the platform");
                    }
                    spoke = true;
                }
                Command::Listen => {
                    spoke = false;
                    let Some(event) = self.listen(&mut arbiter).await else {
                        return;
                    };
                    self.emit(event).await;
                }
                Command::ReleaseAudio => {
                    arbiter.enter_idle();
                    spoke = false;
                }
                Command::Call(_) => {}
            }
        }

        if spoke {
            self.emit(Event::SpeechDone).await;
        }
    }

    /// Capture one utterance; `None` when the turn was superseded
    async fn listen(&self, arbiter: &mut AudioArbiter) -> Option<Event> {
        let epoch = self.epoch;
        let partials = self.inputs.clone();

        let result = capture_utterance(
            arbiter,
            Some(self.locale.language_tag()),
            &self.endpoint,
            &self.token,
            |text: &str| {
                let _ = partials.try_send(Input::Partial {
                    epoch,
                    text: text.to_string(),
                });
            },
        )
        .await;

        match result {
            Ok(Some(text)) => {
                tracing::info!(text = %text, "heard");
                Some(Event::Heard(Utterance::classify(text, self.locale)))
            }
            Ok(None) => Some(Event::Silence),
            Err(Error::Cancelled) => None,
            Err(e) => {
                tracing::warn!(error = %e, "listening failed");
                Some(Event::ListenFailed(e.to_string()))
            }
        }
    }

    async fn emit(&self, event: Event) {
        let _ = self
            .inputs
            .send(Input::Internal {
                epoch: self.epoch,
                event,
            })
            .await;
    }
}

/// Remote collaborators plus the policies calls run under
#[derive(Clone)]
struct Remote {
    cards: Arc<dyn CardService>,
    grader: Arc<dyn GradingService>,
    card_policy: RetryPolicy,
    grading_policy: RetryPolicy,
    reviewer_settle: Duration,
    same_card_delay: Duration,
}

impl Remote {
    /// Run `request` to completion; `None` when the call was superseded
    async fn execute(
        &self,
        request: RemoteRequest,
        policy: &RetryPolicy,
        call: &RemoteCall,
    ) -> Option<RemoteEvent> {
        let token = call.token();
        let cards = self.cards.as_ref();
        let grader = self.grader.as_ref();

        let (attempts, event) = match request {
            RemoteRequest::FetchCard { after } => {
                let delay = self.same_card_delay;
                let done = policy
                    .run(call, || flows::fetch_next_card(cards, after, delay, &token))
                    .await;
                (done.attempts, RemoteEvent::CardFetched(done.outcome))
            }
            RemoteRequest::SubmitGrade { card_id, ease } => {
                let settle = self.reviewer_settle;
                let done = policy
                    .run(call, || {
                        flows::submit_grade_with_reveal(cards, card_id, ease, settle, &token)
                    })
                    .await;
                let event = RemoteEvent::GradeSubmitted {
                    card_id,
                    ease,
                    outcome: done.outcome,
                };
                (done.attempts, event)
            }
            RemoteRequest::Grade(request) => {
                let done = policy
                    .run(call, || grader.grade_with_explanation(&request))
                    .await;
                (done.attempts, RemoteEvent::Graded(done.outcome))
            }
            RemoteRequest::FollowUp(request) => {
                let done = policy.run(call, || grader.answer_follow_up(&request)).await;
                (done.attempts, RemoteEvent::FollowUpAnswered(done.outcome))
            }
            RemoteRequest::Undo => {
                let done = policy.run(call, || cards.undo_last_grade()).await;
                (done.attempts, RemoteEvent::Undone(done.outcome))
            }
            RemoteRequest::Suspend { card_id } => {
                let done = policy.run(call, || cards.suspend_card(card_id)).await;
                (done.attempts, RemoteEvent::Suspended(done.outcome))
            }
        };

        if call.is_cancelled() {
            tracing::debug!(kind = ?call.kind, attempts, "remote call superseded");
            return None;
        }
        tracing::debug!(kind = ?call.kind, attempts, "remote call finished");
        Some(event)
    }
}
