//! HTTP client for the anki-voice server
//!
//! The server fronts both the Anki reviewer (via its add-on and `AnkiConnect`)
//! and the grading LLM. Errors come back as `{"detail": "..."}` bodies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{CardService, FollowUpRequest, Grading, GradingRequest, GradingService, Health};
use crate::card::{Card, CardId, DeckStats, Ease};
use crate::config::RemoteConfig;
use crate::{Error, Result};

/// Client for the card and grading backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: Client,
    /// Base URL, without a trailing slash
    base_url: String,
    card_timeout: Duration,
    grading_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    status: String,
    #[serde(rename = "cardId")]
    card_id: Option<i64>,
    #[serde(default)]
    front_html: String,
    #[serde(default)]
    back_html: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecksResponse {
    Wrapped { decks: Vec<String> },
    Bare(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl HttpBackend {
    /// Create a client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: &RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            card_timeout: config.card_timeout,
            grading_timeout: config.grading_timeout,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .timeout(self.card_timeout)
    }

    fn post(&self, path: &str, timeout: Duration) -> RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .timeout(timeout)
    }

    /// Send a request and map error statuses onto [`Error`]
    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_detail(&body);

        Err(match status {
            StatusCode::CONFLICT => Error::ReviewerNotReady(message),
            StatusCode::NOT_FOUND => Error::NotFound(message),
            _ => Error::Backend {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Pull the human-readable message out of an error body
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl CardService for HttpBackend {
    async fn fetch_current_card(&self) -> Result<Option<Card>> {
        let response = Self::send(self.get("/current")).await?;
        let current: CurrentResponse = response.json().await?;

        if current.status != "ok" {
            tracing::debug!(
                status = %current.status,
                message = current.message.as_deref().unwrap_or_default(),
                "no card available"
            );
            return Ok(None);
        }

        let Some(id) = current.card_id else {
            return Err(Error::Backend {
                status: 200,
                message: "current card without cardId".to_string(),
            });
        };

        Ok(Some(Card::from_html(
            CardId(id),
            &current.front_html,
            &current.back_html,
        )))
    }

    async fn reveal_answer(&self) -> Result<()> {
        Self::send(self.post("/show-answer", self.card_timeout)).await?;
        Ok(())
    }

    async fn submit_grade(&self, card_id: CardId, ease: Ease) -> Result<()> {
        let body = json!({ "cardId": card_id, "ease": ease });
        Self::send(self.post("/submit-grade", self.card_timeout).json(&body)).await?;
        tracing::debug!(card_id = %card_id, ease = ease.as_u8(), "grade submitted");
        Ok(())
    }

    async fn undo_last_grade(&self) -> Result<()> {
        Self::send(self.post("/undo", self.card_timeout)).await?;
        Ok(())
    }

    async fn list_decks(&self) -> Result<Vec<String>> {
        let response = Self::send(self.get("/decks")).await?;
        let decks = match response.json().await? {
            DecksResponse::Wrapped { decks } | DecksResponse::Bare(decks) => decks,
        };
        Ok(decks)
    }

    async fn switch_deck(&self, name: &str) -> Result<()> {
        let body = json!({ "name": name });
        Self::send(self.post("/switch-deck", self.card_timeout).json(&body)).await?;
        Ok(())
    }

    async fn deck_stats(&self, name: &str) -> Result<DeckStats> {
        let path = format!("/deck-stats?name={}", urlencoding::encode(name));
        let response = Self::send(self.get(&path)).await?;
        Ok(response.json().await?)
    }

    async fn suspend_card(&self, card_id: CardId) -> Result<()> {
        let body = json!({ "cardId": card_id });
        Self::send(self.post("/suspend", self.card_timeout).json(&body)).await?;
        Ok(())
    }

    async fn health(&self) -> Result<Health> {
        let response = Self::send(self.get("/health")).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GradingService for HttpBackend {
    async fn grade_with_explanation(&self, request: &GradingRequest) -> Result<Grading> {
        let response = Self::send(
            self.post("/grade-with-explanation", self.grading_timeout)
                .json(request),
        )
        .await?;
        Ok(response.json().await?)
    }

    async fn answer_follow_up(&self, request: &FollowUpRequest) -> Result<String> {
        let response = Self::send(self.post("/ask", self.grading_timeout).json(request)).await?;
        let ask: AskResponse = response.json().await?;
        Ok(ask.answer)
    }
}
