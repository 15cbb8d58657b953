//! End-to-end review sessions over in-memory collaborators

mod common;

use std::time::Duration;

use tokio_test::assert_ok;

use anki_voice::Error;
use anki_voice::card::{CardId, Ease};
use anki_voice::remote::retry::CallKind;
use anki_voice::session::{Event, Snapshot, StateTag, prompts};
use anki_voice::voice::{AudioRoute, Locale, TranscriptSource};

use common::{Harness, ScriptedCards, ScriptedGrader, card};

fn two_cards() -> ScriptedCards {
    ScriptedCards::new([
        card(1, "Capital of France?", "Paris"),
        card(2, "Capital of Spain?", "Madrid"),
    ])
}

fn on_card(snapshot: &Snapshot, state: StateTag, id: i64) -> bool {
    snapshot.state == state && snapshot.card.as_ref().is_some_and(|c| c.id == CardId(id))
}

async fn answering(h: &Harness) {
    assert_ok!(h.session.send(Event::Start).await);
    h.wait_for("first card awaiting answer", |s| {
        on_card(s, StateTag::AwaitingAnswer, 1)
    })
    .await;
}

// -- grading by voice ---------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn spoken_grade_advances_to_next_card() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    h.recognizer.say("good");

    assert_ok!(h.session.send(Event::Start).await);
    let first = h
        .wait_for("first card", |s| s.state == StateTag::ReadingFront)
        .await;
    assert_eq!(first.card.unwrap().id, CardId(1));

    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;

    assert_eq!(h.cards.grades(), vec![(CardId(1), Ease::Good)]);
    assert_eq!(h.cards.reveals(), 1);
    assert_eq!(h.synth.spoken()[0], "Capital of France?");
    assert!(h.holders.max() <= 1, "playback and capture overlapped");

    let holders = h.holders.clone();
    h.close().await;
    assert_eq!(holders.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn hedged_grade_needs_confirmation() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.send(Event::ReadAnswer).await);
    let revealed = h
        .wait_for("answer side", |s| on_card(s, StateTag::AwaitingAction, 1))
        .await;
    assert_eq!(
        revealed.card.unwrap().back_text.as_deref(),
        Some("Paris")
    );

    assert_ok!(h.session.hear("that was good").await);
    let confirming = h
        .wait_for("confirmation", |s| s.state == StateTag::ConfirmingGrade)
        .await;
    assert_eq!(confirming.pending_ease, Some(Ease::Good));
    assert!(h.cards.grades().is_empty());

    assert_ok!(h.session.hear("confirm").await);
    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;
    assert_eq!(h.cards.grades(), vec![(CardId(1), Ease::Good)]);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn cancelled_confirmation_keeps_card() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.hear("pretty easy").await);
    let confirming = h
        .wait_for("confirmation", |s| s.state == StateTag::ConfirmingGrade)
        .await;
    assert_eq!(confirming.pending_ease, Some(Ease::Easy));

    assert_ok!(h.session.hear("cancel").await);
    let back = h
        .wait_for("back to actions", |s| on_card(s, StateTag::AwaitingAction, 1))
        .await;
    assert_eq!(back.message.as_deref(), Some(prompts::grade_cancelled(Locale::En)));
    assert!(h.cards.grades().is_empty());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn grade_button_matches_voice() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.send(Event::GradeButton(Ease::Hard)).await);
    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;
    assert_eq!(h.cards.grades(), vec![(CardId(1), Ease::Hard)]);

    h.close().await;
}

// -- free answers -------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn free_answer_is_explained() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.hear("the capital is paris").await);
    let explaining = h
        .wait_for("explanation", |s| s.state == StateTag::Explaining)
        .await;
    assert_eq!(explaining.explanation.as_deref(), Some("That is correct."));

    let action = h
        .wait_for("actions", |s| on_card(s, StateTag::AwaitingAction, 1))
        .await;
    assert_eq!(action.card.unwrap().back_text.as_deref(), Some("Paris"));
    assert!(h.synth.spoken().iter().any(|text| text == "That is correct."));
    assert_eq!(h.grader.finished(), 1);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn follow_up_question_is_answered() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.send(Event::ReadAnswer).await);
    h.wait_for("answer side", |s| on_card(s, StateTag::AwaitingAction, 1))
        .await;

    assert_ok!(h.session.hear("why is paris the capital").await);
    h.wait_until("follow-up spoken", || {
        h.synth
            .spoken()
            .iter()
            .any(|text| text.starts_with("About why is paris the capital"))
    })
    .await;
    assert_eq!(h.session.snapshot().state, StateTag::AwaitingAction);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn superseded_grading_is_discarded() {
    let grader = ScriptedGrader::new(Duration::from_secs(10), "Correct.");
    let h = Harness::start(two_cards(), grader);
    answering(&h).await;

    assert_ok!(h.session.hear("the capital is paris").await);
    h.wait_for("grading call", |s| {
        s.pending_call.as_ref().is_some_and(|call| call.kind == CallKind::Grade)
    })
    .await;
    h.wait_until("grader started", || h.grader.started() == 1).await;

    assert_ok!(h.session.send(Event::GradeButton(Ease::Good)).await);
    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;

    // Well past the grader's delay
    tokio::time::sleep(Duration::from_secs(30)).await;

    let snapshot = h.session.snapshot();
    assert_ne!(snapshot.state, StateTag::Explaining);
    assert!(snapshot.explanation.is_none());
    assert_eq!(h.grader.finished(), 0);
    assert!(!h.synth.spoken().iter().any(|text| text == "Correct."));
    assert_eq!(h.cards.grades(), vec![(CardId(1), Ease::Good)]);

    h.close().await;
}

// -- control phrases ----------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn delete_confirmed_suspends_and_advances() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.hear("delete this card").await);
    h.wait_for("delete confirmation", |s| s.state == StateTag::ConfirmingDelete)
        .await;

    assert_ok!(h.session.hear("yes").await);
    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;
    assert_eq!(h.cards.suspended(), vec![CardId(1)]);
    assert!(h.cards.grades().is_empty());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn delete_cancelled_returns_to_answer() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.hear("delete this card").await);
    h.wait_for("delete confirmation", |s| s.state == StateTag::ConfirmingDelete)
        .await;

    assert_ok!(h.session.hear("no").await);
    let snapshot = h
        .wait_for("answer again", |s| on_card(s, StateTag::AwaitingAnswer, 1))
        .await;
    assert_eq!(snapshot.message.as_deref(), Some(prompts::delete_cancelled(Locale::En)));
    assert!(h.cards.suspended().is_empty());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn undo_returns_to_graded_card() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.send(Event::GradeButton(Ease::Again)).await);
    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;

    assert_ok!(h.session.send(Event::Undo).await);
    h.wait_for("first card again", |s| on_card(s, StateTag::ReadingFront, 1))
        .await;
    assert!(h.cards.grades().is_empty());

    h.close().await;
}

// -- stopping -----------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_releases_microphone() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;
    h.wait_until("microphone open", || h.recognizer.is_alive()).await;
    assert_eq!(h.holders.active(), 1);

    assert_ok!(h.session.send(Event::Stop).await);
    let stopped = h.wait_for("idle", |s| s.state == StateTag::Idle).await;
    assert_eq!(stopped.message.as_deref(), Some(prompts::stopped(Locale::En)));
    assert!(stopped.card.is_none());

    h.wait_until("microphone released", || h.holders.active() == 0)
        .await;
    assert!(!h.recognizer.is_alive());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn backgrounded_goes_idle_quietly() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.send(Event::Backgrounded).await);
    let idle = h.wait_for("idle", |s| s.state == StateTag::Idle).await;
    assert!(idle.message.is_none());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn closed_session_rejects_events() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    let session = h.session.clone();
    h.close().await;

    assert!(matches!(
        session.send(Event::Start).await,
        Err(Error::SessionClosed)
    ));
}

// -- failures -----------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn no_cards_is_announced() {
    let h = Harness::start(ScriptedCards::empty(), ScriptedGrader::instant());

    assert_ok!(h.session.send(Event::Start).await);
    let idle = h
        .wait_for("no cards message", |s| {
            s.state == StateTag::Idle && s.message.is_some()
        })
        .await;
    assert_eq!(idle.message.as_deref(), Some(prompts::no_cards(Locale::En)));

    h.wait_until("message spoken", || !h.synth.spoken().is_empty())
        .await;
    assert_eq!(h.synth.spoken(), vec![prompts::no_cards(Locale::En)]);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn reviewer_not_ready_falls_back_to_actions() {
    let not_ready = || Err(Error::ReviewerNotReady("no card showing".to_string()));
    let cards = two_cards().with_submit_results([not_ready(), not_ready()]);
    let h = Harness::start(cards, ScriptedGrader::instant());
    answering(&h).await;

    assert_ok!(h.session.hear("good").await);
    let fallback = h
        .wait_for("fallback", |s| {
            on_card(s, StateTag::AwaitingAction, 1) && s.message.is_some()
        })
        .await;

    assert!(fallback.message.unwrap().contains("Open the reviewer"));
    assert!(fallback.pending_call.is_none());
    assert!(h.cards.grades().is_empty());

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn silence_reprompts() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;

    h.wait_until("reprompt", || {
        h.synth
            .spoken()
            .iter()
            .any(|text| text == prompts::didnt_catch(Locale::En))
    })
    .await;
    assert!(h.recognizer.starts() >= 1);
    assert!(h.holders.max() <= 1);

    h.close().await;
}

// -- remote retries -----------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_grading_shows_retry_then_gives_up() {
    let grader = ScriptedGrader::new(Duration::from_secs(60), "Correct.");
    let h = Harness::start(two_cards(), grader);
    answering(&h).await;

    assert_ok!(h.session.hear("the capital is paris").await);
    let first = h
        .wait_for("first attempt", |s| {
            s.pending_call.as_ref().is_some_and(|call| call.attempts == 1)
        })
        .await;
    assert_eq!(first.pending_call.unwrap().kind, CallKind::Grade);

    let retry = h
        .wait_for("second attempt", |s| {
            s.pending_call.as_ref().is_some_and(|call| call.attempts == 2)
        })
        .await;
    assert_eq!(retry.epoch, first.epoch);

    let gave_up = h
        .wait_for("timeout notice", |s| {
            s.message.as_deref() == Some(prompts::took_too_long(Locale::En))
        })
        .await;
    assert!(on_card(&gave_up, StateTag::AwaitingAction, 1));
    assert!(gave_up.pending_call.is_none());
    assert_eq!(h.grader.started(), 2);
    assert_eq!(h.grader.finished(), 0);

    h.close().await;
}

// -- audio path ---------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn crashed_recognizer_restarts_in_place() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    answering(&h).await;
    h.wait_until("microphone open", || h.recognizer.is_alive()).await;
    let listening = h.session.snapshot();
    assert_eq!(h.recognizer.starts(), 1);

    h.recognizer.say("good");
    h.recognizer.crash();

    h.wait_until("recognizer restarted", || h.recognizer.starts() == 2)
        .await;
    let restarted = h.session.snapshot();
    assert!(on_card(&restarted, StateTag::AwaitingAnswer, 1));
    assert_eq!(restarted.epoch, listening.epoch);

    h.wait_for("second card", |s| on_card(s, StateTag::ReadingFront, 2))
        .await;
    assert_eq!(h.cards.grades(), vec![(CardId(1), Ease::Good)]);
    assert!(h.holders.max() <= 1);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn route_change_while_idle_is_recovered() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());

    h.routes.switch_to_earpiece();
    assert_ok!(h.session.route_changed().await);

    h.wait_until("speaker restored", || h.routes.output() == AudioRoute::Speaker)
        .await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, StateTag::Idle);
    assert_eq!(snapshot.epoch, 0);

    h.close().await;
}

#[tokio::test(start_paused = true)]
async fn route_change_during_playback_keeps_reading() {
    let h = Harness::start(two_cards(), ScriptedGrader::instant());
    assert_ok!(h.session.send(Event::Start).await);
    let reading = h
        .wait_for("front", |s| on_card(s, StateTag::ReadingFront, 1))
        .await;
    h.wait_until("playback started", || !h.synth.spoken().is_empty())
        .await;

    h.routes.switch_to_earpiece();
    assert_ok!(h.session.route_changed().await);

    h.wait_until("speaker restored", || h.routes.output() == AudioRoute::Speaker)
        .await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, StateTag::ReadingFront);
    assert_eq!(snapshot.epoch, reading.epoch);

    h.wait_for("answer", |s| on_card(s, StateTag::AwaitingAnswer, 1))
        .await;
    assert_eq!(h.synth.spoken(), vec!["Capital of France?"]);

    h.close().await;
}
