//! Session states, events, and the commands transitions emit

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::card::{Card, CardId, Ease};
use crate::remote::retry::CallKind;
use crate::remote::{CallOutcome, FollowUpRequest, Grading, GradingRequest};
use crate::voice::{Intent, IntentClassifier, Locale, SpeechRequest, VoiceCommand, recognize_command};

/// What the user is experiencing now; exactly one is live per session
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Idle,
    ReadingFront {
        card: Arc<Card>,
    },
    AwaitingAnswer {
        card: Arc<Card>,
    },
    Explaining {
        card: Arc<Card>,
        explanation: String,
    },
    AwaitingAction {
        card: Arc<Card>,
        showing_back: bool,
    },
    ConfirmingGrade {
        card: Arc<Card>,
        pending_ease: Ease,
    },
    ConfirmingDelete {
        card: Arc<Card>,
    },
}

/// Variant of a [`SessionState`] without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Idle,
    ReadingFront,
    AwaitingAnswer,
    Explaining,
    AwaitingAction,
    ConfirmingGrade,
    ConfirmingDelete,
}

impl SessionState {
    #[must_use]
    pub const fn tag(&self) -> StateTag {
        match self {
            Self::Idle => StateTag::Idle,
            Self::ReadingFront { .. } => StateTag::ReadingFront,
            Self::AwaitingAnswer { .. } => StateTag::AwaitingAnswer,
            Self::Explaining { .. } => StateTag::Explaining,
            Self::AwaitingAction { .. } => StateTag::AwaitingAction,
            Self::ConfirmingGrade { .. } => StateTag::ConfirmingGrade,
            Self::ConfirmingDelete { .. } => StateTag::ConfirmingDelete,
        }
    }

    /// The card under review, if any
    #[must_use]
    pub const fn card(&self) -> Option<&Arc<Card>> {
        match self {
            Self::Idle => None,
            Self::ReadingFront { card }
            | Self::AwaitingAnswer { card }
            | Self::Explaining { card, .. }
            | Self::AwaitingAction { card, .. }
            | Self::ConfirmingGrade { card, .. }
            | Self::ConfirmingDelete { card } => Some(card),
        }
    }
}

/// A finished utterance with both readings attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// Control phrase, when the whole utterance is one
    pub command: Option<VoiceCommand>,
    pub intent: Intent,
    /// Nothing but hesitation sounds
    pub filler: bool,
}

impl Utterance {
    /// Classify raw recognizer text for `locale`
    #[must_use]
    pub fn classify(text: impl Into<String>, locale: Locale) -> Self {
        let text = text.into();
        let classifier = IntentClassifier::new(locale);
        Self {
            command: recognize_command(&text, locale),
            intent: classifier.classify(&text),
            filler: classifier.is_filler(&text),
            text,
        }
    }
}

/// Results of remote calls, delivered back to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    CardFetched(CallOutcome<Option<Card>>),
    GradeSubmitted {
        card_id: CardId,
        ease: Ease,
        outcome: CallOutcome<()>,
    },
    Graded(CallOutcome<Grading>),
    FollowUpAnswered(CallOutcome<String>),
    Undone(CallOutcome<()>),
    Suspended(CallOutcome<()>),
}

/// Triggers the machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Begin reviewing
    Start,
    /// Return to idle at the user's request
    Stop,
    /// The app lost the foreground
    Backgrounded,
    /// Playback of the last spoken prompt finished
    SpeechDone,
    Heard(Utterance),
    /// A listening turn ended without speech
    Silence,
    /// Recognition could not be started
    ListenFailed(String),
    /// On-screen grade button
    GradeButton(Ease),
    /// On-screen read-answer button
    ReadAnswer,
    /// On-screen undo button
    Undo,
    Remote(RemoteEvent),
}

/// Variant of an [`Event`] without its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    Start,
    Stop,
    Backgrounded,
    SpeechDone,
    Heard,
    Silence,
    ListenFailed,
    GradeButton,
    ReadAnswer,
    Undo,
    CardFetched,
    GradeSubmitted,
    Graded,
    FollowUpAnswered,
    Undone,
    Suspended,
}

impl Event {
    #[must_use]
    pub const fn tag(&self) -> EventTag {
        match self {
            Self::Start => EventTag::Start,
            Self::Stop => EventTag::Stop,
            Self::Backgrounded => EventTag::Backgrounded,
            Self::SpeechDone => EventTag::SpeechDone,
            Self::Heard(_) => EventTag::Heard,
            Self::Silence => EventTag::Silence,
            Self::ListenFailed(_) => EventTag::ListenFailed,
            Self::GradeButton(_) => EventTag::GradeButton,
            Self::ReadAnswer => EventTag::ReadAnswer,
            Self::Undo => EventTag::Undo,
            Self::Remote(remote) => match remote {
                RemoteEvent::CardFetched(_) => EventTag::CardFetched,
                RemoteEvent::GradeSubmitted { .. } => EventTag::GradeSubmitted,
                RemoteEvent::Graded(_) => EventTag::Graded,
                RemoteEvent::FollowUpAnswered(_) => EventTag::FollowUpAnswered,
                RemoteEvent::Undone(_) => EventTag::Undone,
                RemoteEvent::Suspended(_) => EventTag::Suspended,
            },
        }
    }
}

/// Remote work a transition asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Fetch the reviewer's card; `after` is the card just answered
    FetchCard { after: Option<CardId> },
    SubmitGrade { card_id: CardId, ease: Ease },
    Grade(GradingRequest),
    FollowUp(FollowUpRequest),
    Undo,
    Suspend { card_id: CardId },
}

impl RemoteRequest {
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::FetchCard { .. } => CallKind::FetchCard,
            Self::SubmitGrade { .. } => CallKind::SubmitGrade,
            Self::Grade(_) => CallKind::Grade,
            Self::FollowUp(_) => CallKind::FollowUp,
            Self::Undo => CallKind::Undo,
            Self::Suspend { .. } => CallKind::Suspend,
        }
    }
}

/// Side effects requested by a transition, run in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Take the audio path for playback and speak
    Speak(SpeechRequest),
    /// Take the microphone and capture one utterance
    Listen,
    /// Give up the audio path
    ReleaseAudio,
    /// Issue a remote call under the retry policy
    Call(RemoteRequest),
}

/// New state plus the commands that realize it
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: SessionState,
    pub commands: Vec<Command>,
    /// Text for the presentation layer
    pub message: Option<String>,
}

/// Card fields shown to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardSummary {
    pub id: CardId,
    pub front_text: String,
    /// Only present once the answer side has been revealed
    pub back_text: Option<String>,
}

/// Remote call in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCall {
    pub kind: CallKind,
    pub attempts: u32,
}

/// Immutable view of the session published after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub session_id: Uuid,
    pub epoch: u64,
    pub state: StateTag,
    pub card: Option<CardSummary>,
    pub explanation: Option<String>,
    pub pending_ease: Option<Ease>,
    /// Live transcript while listening
    pub transcript: String,
    pub pending_call: Option<PendingCall>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot of `state` as seen at `epoch`
    #[must_use]
    pub fn capture(session_id: Uuid, epoch: u64, state: &SessionState) -> Self {
        let showing_back = matches!(
            state,
            SessionState::AwaitingAction {
                showing_back: true,
                ..
            } | SessionState::Explaining { .. }
                | SessionState::ConfirmingGrade { .. }
        );

        let card = state.card().map(|card| CardSummary {
            id: card.id,
            front_text: card.front_text.clone(),
            back_text: showing_back.then(|| card.back_text.clone()),
        });

        let explanation = match state {
            SessionState::Explaining { explanation, .. } => Some(explanation.clone()),
            _ => None,
        };

        let pending_ease = match state {
            SessionState::ConfirmingGrade { pending_ease, .. } => Some(*pending_ease),
            _ => None,
        };

        Self {
            session_id,
            epoch,
            state: state.tag(),
            card,
            explanation,
            pending_ease,
            transcript: String::new(),
            pending_call: None,
            message: None,
            updated_at: Utc::now(),
        }
    }
}
