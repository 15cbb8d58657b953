//! Multi-step scheduler operations
//!
//! Both flows work around reviewer timing: the answer side has to be showing
//! before a grade is accepted, and right after a grade the reviewer may still
//! report the card that was just answered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::CardService;
use crate::card::{Card, CardId, Ease};
use crate::{Error, Result};

/// Reveal the answer, then submit the grade
///
/// A grade rejected because the reviewer was not ready is re-submitted once
/// after `settle`.
///
/// # Errors
///
/// Returns the reveal or grade error, or `Cancelled` if `token` fires while
/// settling
pub async fn submit_grade_with_reveal(
    cards: &dyn CardService,
    card_id: CardId,
    ease: Ease,
    settle: Duration,
    token: &CancellationToken,
) -> Result<()> {
    cards.reveal_answer().await?;

    match cards.submit_grade(card_id, ease).await {
        Err(Error::ReviewerNotReady(message)) => {
            tracing::warn!(card_id = %card_id, %message, "reviewer not ready, retrying grade");
            pause(settle, token).await?;
            cards.submit_grade(card_id, ease).await
        }
        other => other,
    }
}

/// Fetch the next card, tolerating a scheduler that has not advanced yet
///
/// When the fetched card is `after` (the card just answered), waits `delay`
/// and fetches once more, accepting whatever comes back so a genuinely
/// repeated last card does not stall the session.
///
/// # Errors
///
/// Returns the fetch error, or `Cancelled` if `token` fires while waiting
pub async fn fetch_next_card(
    cards: &dyn CardService,
    after: Option<CardId>,
    delay: Duration,
    token: &CancellationToken,
) -> Result<Option<Card>> {
    let card = cards.fetch_current_card().await?;

    let Some(previous) = after else {
        return Ok(card);
    };
    if card.as_ref().is_none_or(|c| c.id != previous) {
        return Ok(card);
    }

    tracing::debug!(card_id = %previous, "scheduler returned the answered card, re-fetching");
    pause(delay, token).await?;

    let card = cards.fetch_current_card().await?;
    if card.as_ref().is_some_and(|c| c.id == previous) {
        tracing::info!(card_id = %previous, "same card after grade, proceeding with it");
    }
    Ok(card)
}

async fn pause(duration: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        () = token.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
