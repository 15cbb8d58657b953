//! Remote collaborators
//!
//! The card scheduler and the semantic grader are reached over HTTP in
//! production ([`http::HttpBackend`]) and through in-memory fakes in tests.
//! Every call the session makes goes through [`retry::RetryPolicy`], and
//! multi-step operations live in [`flows`].

pub mod flows;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::card::{Card, CardId, DeckStats, Ease};

pub use retry::{Attempted, CallFailure, CallOutcome, RetryPolicy};

/// The flashcard scheduler
#[async_trait]
pub trait CardService: Send + Sync {
    /// Card the reviewer is showing, or `None` when nothing is due
    async fn fetch_current_card(&self) -> Result<Option<Card>>;

    /// Flip the reviewer to the answer side
    async fn reveal_answer(&self) -> Result<()>;

    /// Answer the current card; the answer side must be showing
    async fn submit_grade(&self, card_id: CardId, ease: Ease) -> Result<()>;

    /// Revert the most recent answer
    async fn undo_last_grade(&self) -> Result<()>;

    async fn list_decks(&self) -> Result<Vec<String>>;

    async fn switch_deck(&self, name: &str) -> Result<()>;

    async fn deck_stats(&self, name: &str) -> Result<DeckStats>;

    /// Take a card out of rotation
    async fn suspend_card(&self, card_id: CardId) -> Result<()>;

    /// Backend liveness
    async fn health(&self) -> Result<Health>;
}

/// The semantic grader
#[async_trait]
pub trait GradingService: Send + Sync {
    /// Judge a spoken answer against the card's reference answer
    async fn grade_with_explanation(&self, request: &GradingRequest) -> Result<Grading>;

    /// Answer a follow-up question about the card
    async fn answer_follow_up(&self, request: &FollowUpRequest) -> Result<String>;
}

/// Input for [`GradingService::grade_with_explanation`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradingRequest {
    #[serde(rename = "cardId")]
    pub card_id: CardId,
    pub transcript: String,
    #[serde(rename = "question_text")]
    pub question: String,
    #[serde(rename = "reference_text")]
    pub reference: String,
}

/// Input for [`GradingService::answer_follow_up`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUpRequest {
    #[serde(rename = "cardId")]
    pub card_id: CardId,
    /// The user's question
    pub question: String,
    /// The card's question side
    #[serde(rename = "question_text")]
    pub card_question: String,
    #[serde(rename = "reference_text")]
    pub reference: String,
}

/// Verdict on a spoken answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    pub explanation: String,
    /// 0.0..=1.0 when the grader reports one
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Reference points the answer left out
    #[serde(default)]
    pub missing: Vec<String>,
    /// Claims in the answer not backed by the reference
    #[serde(default)]
    pub extras: Vec<String>,
}

impl Grading {
    /// Ease hinted at by the grader's confidence
    ///
    /// Nothing missing counts as correct: above 0.85 that is `Easy`, otherwise
    /// `Good`. Some points missing with confidence at least 0.5 is `Hard`.
    #[must_use]
    pub fn suggested_ease(&self) -> Option<Ease> {
        let confidence = self.confidence?;
        let correct = self.missing.is_empty();

        Some(if correct && confidence > 0.85 {
            Ease::Easy
        } else if correct {
            Ease::Good
        } else if confidence >= 0.5 {
            Ease::Hard
        } else {
            Ease::Again
        })
    }
}

/// Backend health report, one status string per component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub anki_addon: String,
    #[serde(default)]
    pub ankiconnect: String,
    #[serde(default)]
    pub anki_running: String,
}

impl Health {
    /// Whether every component the session needs reports `ok`
    #[must_use]
    pub fn is_ok(&self) -> bool {
        [&self.server, &self.anki_addon, &self.ankiconnect]
            .iter()
            .all(|status| status.as_str() == "ok")
    }
}
