//! The review state machine as a table of pure handlers
//!
//! Rules are tried in order; the first whose source matches the current state,
//! whose event matches, and whose handler accepts the event wins. A handler
//! declines by returning `None`, which lets later, more general rules (voice
//! controls, wildcard sources) take over. An event no rule accepts is ignored.

use std::sync::Arc;

use super::prompts;
use super::state::{
    Command, Event, EventTag, RemoteEvent, RemoteRequest, SessionState, StateTag, Transition,
    Utterance,
};
use crate::card::{Card, Ease};
use crate::remote::{CallOutcome, FollowUpRequest, GradingRequest};
use crate::voice::{Intent, Locale, SpeechRequest, VoiceCommand};

use self::Source::{Any, Only, WithCard};
use super::state::EventTag as E;

/// What a transition may consult besides the state and event
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    pub locale: Locale,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Any,
    /// Any state holding a card
    WithCard,
    Only(StateTag),
}

impl Source {
    fn matches(self, state: &SessionState) -> bool {
        match self {
            Self::Any => true,
            Self::WithCard => state.card().is_some(),
            Self::Only(tag) => state.tag() == tag,
        }
    }
}

type Handler = fn(&SessionState, &Event, &Context) -> Option<Transition>;

struct Rule {
    from: Source,
    on: EventTag,
    handler: Handler,
}

const fn rule(from: Source, on: EventTag, handler: Handler) -> Rule {
    Rule { from, on, handler }
}

const RULES: &[Rule] = &[
    rule(Only(StateTag::Idle), E::Start, start),
    rule(Any, E::Stop, stop),
    rule(Any, E::Backgrounded, stop),
    // playback finished
    rule(Only(StateTag::ReadingFront), E::SpeechDone, front_read),
    rule(Only(StateTag::Explaining), E::SpeechDone, explanation_read),
    rule(WithCard, E::SpeechDone, listen_again),
    // utterances
    rule(Only(StateTag::AwaitingAnswer), E::Heard, answer_heard),
    rule(Only(StateTag::AwaitingAction), E::Heard, action_heard),
    rule(Only(StateTag::ConfirmingGrade), E::Heard, grade_confirmation_heard),
    rule(Only(StateTag::ConfirmingDelete), E::Heard, delete_confirmation_heard),
    rule(WithCard, E::Heard, control_heard),
    rule(Only(StateTag::AwaitingAnswer), E::Silence, reprompt_answer),
    rule(Only(StateTag::ConfirmingGrade), E::Silence, reprompt_grade),
    rule(Only(StateTag::ConfirmingDelete), E::Silence, reprompt_delete),
    rule(Only(StateTag::AwaitingAction), E::Silence, listen_again),
    rule(WithCard, E::ListenFailed, listen_failed),
    // on-screen controls
    rule(WithCard, E::GradeButton, grade_button),
    rule(WithCard, E::ReadAnswer, read_answer),
    rule(Any, E::Undo, undo),
    // remote results
    rule(Any, E::CardFetched, card_fetched),
    rule(Only(StateTag::AwaitingAnswer), E::Graded, graded),
    rule(WithCard, E::GradeSubmitted, grade_submitted),
    rule(WithCard, E::FollowUpAnswered, follow_up_answered),
    rule(Any, E::Undone, undone),
    rule(WithCard, E::Suspended, suspended),
];

/// Compute the transition for `event` in `state`, or `None` to ignore it
#[must_use]
pub fn transition(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let tag = event.tag();
    RULES
        .iter()
        .filter(|rule| rule.on == tag && rule.from.matches(state))
        .find_map(|rule| (rule.handler)(state, event, ctx))
}

// -- builders -----------------------------------------------------------------

fn to(next: SessionState, commands: Vec<Command>) -> Transition {
    Transition {
        next,
        commands,
        message: None,
    }
}

/// Speak a session prompt and show it
fn say(next: SessionState, text: impl Into<String>, ctx: &Context) -> Transition {
    let text = text.into();
    Transition {
        next,
        commands: vec![Command::Speak(SpeechRequest::new(
            text.clone(),
            Some(ctx.locale.language_tag().to_string()),
        ))],
        message: Some(text),
    }
}

fn speak_front(card: &Card) -> Command {
    let text = if card.front_speech_text.is_empty() {
        &card.front_text
    } else {
        &card.front_speech_text
    };
    Command::Speak(SpeechRequest::new(text.clone(), card.front_language.clone()))
}

fn speak_back(card: &Card) -> Command {
    let text = if card.back_speech_text.is_empty() {
        &card.back_text
    } else {
        &card.back_speech_text
    };
    Command::Speak(SpeechRequest::new(text.clone(), card.back_language.clone()))
}

fn submit(card: &Arc<Card>, ease: Ease) -> Transition {
    Transition {
        next: SessionState::AwaitingAction {
            card: Arc::clone(card),
            showing_back: true,
        },
        commands: vec![
            Command::ReleaseAudio,
            Command::Call(RemoteRequest::SubmitGrade {
                card_id: card.id,
                ease,
            }),
        ],
        message: None,
    }
}

fn confirm(card: &Arc<Card>, ease: Ease, ctx: &Context) -> Transition {
    say(
        SessionState::ConfirmingGrade {
            card: Arc::clone(card),
            pending_ease: ease,
        },
        prompts::confirm_grade(ease, ctx.locale),
        ctx,
    )
}

/// Same state with the session waiting on remote work
fn call(state: &SessionState, request: RemoteRequest) -> Transition {
    to(
        state.clone(),
        vec![Command::ReleaseAudio, Command::Call(request)],
    )
}

/// The card kept on screen with a spoken notice, ready for the next utterance
fn recover(
    card: &Arc<Card>,
    showing_back: bool,
    text: impl Into<String>,
    ctx: &Context,
) -> Transition {
    say(
        SessionState::AwaitingAction {
            card: Arc::clone(card),
            showing_back,
        },
        text,
        ctx,
    )
}

/// Whether the back of the card has been revealed in `state`
fn back_revealed(state: &SessionState) -> bool {
    match state {
        SessionState::AwaitingAction { showing_back, .. } => *showing_back,
        SessionState::Explaining { .. } | SessionState::ConfirmingGrade { .. } => true,
        _ => false,
    }
}

fn failure_text<T>(outcome: &CallOutcome<T>, ctx: &Context) -> Option<String> {
    match outcome {
        CallOutcome::Done(_) | CallOutcome::Cancelled => None,
        CallOutcome::TimedOut => Some(prompts::took_too_long(ctx.locale).to_string()),
        CallOutcome::Failed(failure) => Some(prompts::call_failed(failure, ctx.locale)),
    }
}

/// Controls handled by the shared rule rather than per-state handlers
const fn is_control(command: Option<VoiceCommand>) -> bool {
    matches!(
        command,
        Some(
            VoiceCommand::Stop
                | VoiceCommand::Undo
                | VoiceCommand::Delete
                | VoiceCommand::ReadAnswer
                | VoiceCommand::Repeat
        )
    )
}

fn heard(event: &Event) -> Option<&Utterance> {
    match event {
        Event::Heard(utterance) => Some(utterance),
        _ => None,
    }
}

// -- lifecycle ----------------------------------------------------------------

fn start(_: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    Some(to(
        SessionState::Idle,
        vec![Command::Call(RemoteRequest::FetchCard { after: None })],
    ))
}

fn stop(_: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let message = matches!(event, Event::Stop).then(|| prompts::stopped(ctx.locale).to_string());
    Some(Transition {
        next: SessionState::Idle,
        commands: vec![Command::ReleaseAudio],
        message,
    })
}

fn front_read(state: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    let card = state.card()?;
    Some(to(
        SessionState::AwaitingAnswer {
            card: Arc::clone(card),
        },
        vec![Command::Listen],
    ))
}

fn explanation_read(state: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    let card = state.card()?;
    Some(to(
        SessionState::AwaitingAction {
            card: Arc::clone(card),
            showing_back: true,
        },
        vec![Command::Listen],
    ))
}

fn listen_again(state: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    Some(to(state.clone(), vec![Command::Listen]))
}

// -- utterances ---------------------------------------------------------------

fn answer_heard(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let utterance = heard(event)?;

    if utterance.filler {
        return Some(to(state.clone(), vec![Command::Listen]));
    }
    if is_control(utterance.command) {
        return None;
    }

    Some(match utterance.intent {
        Intent::Grade {
            ease,
            unambiguous: true,
        } => submit(card, ease),
        Intent::Grade { ease, .. } => confirm(card, ease, ctx),
        // "yes" and "no" are answers here too
        Intent::Question { .. } | Intent::Ambiguous => call(
            state,
            RemoteRequest::Grade(GradingRequest {
                card_id: card.id,
                transcript: utterance.text.clone(),
                question: card.front_text.clone(),
                reference: card.back_text.clone(),
            }),
        ),
    })
}

fn action_heard(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let utterance = heard(event)?;

    if utterance.filler {
        return Some(to(state.clone(), vec![Command::Listen]));
    }
    if is_control(utterance.command) {
        return None;
    }

    Some(match &utterance.intent {
        Intent::Grade {
            ease,
            unambiguous: true,
        } => submit(card, *ease),
        Intent::Grade { ease, .. } => confirm(card, *ease, ctx),
        Intent::Question { text } => call(
            state,
            RemoteRequest::FollowUp(FollowUpRequest {
                card_id: card.id,
                question: text.clone(),
                card_question: card.front_text.clone(),
                reference: card.back_text.clone(),
            }),
        ),
        Intent::Ambiguous => say(state.clone(), prompts::action_hint(ctx.locale), ctx),
    })
}

fn grade_confirmation_heard(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let SessionState::ConfirmingGrade { card, pending_ease } = state else {
        return None;
    };
    let utterance = heard(event)?;

    match utterance.command {
        Some(VoiceCommand::Confirm) => return Some(submit(card, *pending_ease)),
        Some(VoiceCommand::Cancel) => {
            return Some(say(
                SessionState::AwaitingAction {
                    card: Arc::clone(card),
                    showing_back: true,
                },
                prompts::grade_cancelled(ctx.locale),
                ctx,
            ));
        }
        command if is_control(command) => return None,
        _ => {}
    }

    if utterance.filler {
        return Some(to(state.clone(), vec![Command::Listen]));
    }

    Some(match utterance.intent {
        Intent::Grade {
            ease,
            unambiguous: true,
        } => submit(card, ease),
        Intent::Grade { ease, .. } => confirm(card, ease, ctx),
        Intent::Question { .. } | Intent::Ambiguous => confirm(card, *pending_ease, ctx),
    })
}

fn delete_confirmation_heard(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let utterance = heard(event)?;

    match utterance.command {
        Some(VoiceCommand::Confirm) => Some(call(
            state,
            RemoteRequest::Suspend { card_id: card.id },
        )),
        Some(VoiceCommand::Cancel) => Some(say(
            SessionState::AwaitingAnswer {
                card: Arc::clone(card),
            },
            prompts::delete_cancelled(ctx.locale),
            ctx,
        )),
        command if is_control(command) => None,
        _ if utterance.filler => Some(to(state.clone(), vec![Command::Listen])),
        _ => Some(say(state.clone(), prompts::confirm_delete(ctx.locale), ctx)),
    }
}

/// Voice controls that mean the same thing in every card state
fn control_heard(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;

    match heard(event)?.command? {
        VoiceCommand::Stop => stop(state, &Event::Stop, ctx),
        VoiceCommand::Undo => undo(state, event, ctx),
        VoiceCommand::Delete => Some(say(
            SessionState::ConfirmingDelete {
                card: Arc::clone(card),
            },
            prompts::confirm_delete(ctx.locale),
            ctx,
        )),
        VoiceCommand::ReadAnswer => read_answer(state, event, ctx),
        VoiceCommand::Repeat => Some(to(
            SessionState::ReadingFront {
                card: Arc::clone(card),
            },
            vec![speak_front(card)],
        )),
        VoiceCommand::Confirm | VoiceCommand::Cancel => None,
    }
}

fn reprompt_answer(state: &SessionState, _: &Event, ctx: &Context) -> Option<Transition> {
    Some(say(state.clone(), prompts::didnt_catch(ctx.locale), ctx))
}

fn reprompt_grade(state: &SessionState, _: &Event, ctx: &Context) -> Option<Transition> {
    let SessionState::ConfirmingGrade { card, pending_ease } = state else {
        return None;
    };
    Some(confirm(card, *pending_ease, ctx))
}

fn reprompt_delete(state: &SessionState, _: &Event, ctx: &Context) -> Option<Transition> {
    Some(say(state.clone(), prompts::confirm_delete(ctx.locale), ctx))
}

/// Recognition is gone; keep the card for the on-screen controls
fn listen_failed(state: &SessionState, _: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    Some(Transition {
        next: SessionState::AwaitingAction {
            card: Arc::clone(card),
            showing_back: false,
        },
        commands: vec![Command::ReleaseAudio],
        message: Some(prompts::microphone_unavailable(ctx.locale).to_string()),
    })
}

// -- on-screen controls -------------------------------------------------------

fn grade_button(state: &SessionState, event: &Event, _: &Context) -> Option<Transition> {
    let Event::GradeButton(ease) = event else {
        return None;
    };
    Some(submit(state.card()?, *ease))
}

fn read_answer(state: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    let card = state.card()?;
    Some(to(
        SessionState::AwaitingAction {
            card: Arc::clone(card),
            showing_back: true,
        },
        vec![speak_back(card)],
    ))
}

fn undo(state: &SessionState, _: &Event, _: &Context) -> Option<Transition> {
    Some(call(state, RemoteRequest::Undo))
}

// -- remote results -----------------------------------------------------------

fn card_fetched(_: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let Event::Remote(RemoteEvent::CardFetched(outcome)) = event else {
        return None;
    };

    match outcome {
        CallOutcome::Done(Some(card)) => Some(to(
            SessionState::ReadingFront {
                card: Arc::new(card.clone()),
            },
            vec![speak_front(card)],
        )),
        CallOutcome::Done(None) => Some(say(SessionState::Idle, prompts::no_cards(ctx.locale), ctx)),
        _ => failure_text(outcome, ctx).map(|text| say(SessionState::Idle, text, ctx)),
    }
}

fn graded(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let Event::Remote(RemoteEvent::Graded(outcome)) = event else {
        return None;
    };

    if let CallOutcome::Done(grading) = outcome {
        return Some(say(
            SessionState::Explaining {
                card: Arc::clone(card),
                explanation: grading.explanation.clone(),
            },
            prompts::explanation(grading, ctx.locale),
            ctx,
        ));
    }
    failure_text(outcome, ctx).map(|text| recover(card, back_revealed(state), text, ctx))
}

fn grade_submitted(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let Event::Remote(RemoteEvent::GradeSubmitted {
        card_id,
        ease,
        outcome,
    }) = event
    else {
        return None;
    };

    if let CallOutcome::Done(()) = outcome {
        return Some(Transition {
            next: state.clone(),
            commands: vec![Command::Call(RemoteRequest::FetchCard {
                after: Some(*card_id),
            })],
            message: Some(prompts::graded(*ease, ctx.locale)),
        });
    }
    // The answer is revealed in the reviewer before any submit
    failure_text(outcome, ctx).map(|text| recover(card, true, text, ctx))
}

fn follow_up_answered(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let Event::Remote(RemoteEvent::FollowUpAnswered(outcome)) = event else {
        return None;
    };

    if let CallOutcome::Done(answer) = outcome {
        let showing_back = match state {
            SessionState::AwaitingAction { showing_back, .. } => *showing_back,
            _ => true,
        };
        return Some(say(
            SessionState::AwaitingAction {
                card: Arc::clone(card),
                showing_back,
            },
            answer.clone(),
            ctx,
        ));
    }
    failure_text(outcome, ctx).map(|text| recover(card, back_revealed(state), text, ctx))
}

fn undone(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let Event::Remote(RemoteEvent::Undone(outcome)) = event else {
        return None;
    };

    if let CallOutcome::Done(()) = outcome {
        return Some(call(state, RemoteRequest::FetchCard { after: None }));
    }
    let text = failure_text(outcome, ctx)?;
    Some(match state.card() {
        Some(card) => recover(card, back_revealed(state), text, ctx),
        None => say(SessionState::Idle, text, ctx),
    })
}

fn suspended(state: &SessionState, event: &Event, ctx: &Context) -> Option<Transition> {
    let card = state.card()?;
    let Event::Remote(RemoteEvent::Suspended(outcome)) = event else {
        return None;
    };

    if let CallOutcome::Done(()) = outcome {
        return Some(call(
            state,
            RemoteRequest::FetchCard {
                after: Some(card.id),
            },
        ));
    }
    failure_text(outcome, ctx).map(|text| recover(card, back_revealed(state), text, ctx))
}
