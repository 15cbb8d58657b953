//! Flashcard snapshots fetched from the scheduling collaborator
//!
//! A [`Card`] is immutable: it is created on fetch and replaced wholesale on
//! the next fetch. Display text and speech text are kept apart because the
//! card templates may carry a dedicated `README` block meant for reading aloud.

pub mod html;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Anki card identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anki's 1..=4 answer scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Ease {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Ease {
    /// All eases in scale order
    pub const ALL: [Self; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    /// Numeric value sent to the scheduler
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// English button label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

impl TryFrom<u8> for Ease {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(Error::InvalidEase(other)),
        }
    }
}

impl From<Ease> for u8 {
    fn from(ease: Ease) -> Self {
        ease.as_u8()
    }
}

impl fmt::Display for Ease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable snapshot of the card currently under review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub id: CardId,
    pub front_text: String,
    pub back_text: String,
    pub front_speech_text: String,
    pub back_speech_text: String,
    pub front_language: Option<String>,
    pub back_language: Option<String>,
}

impl Card {
    /// Build a card from the reviewer's rendered question and answer HTML
    ///
    /// The back side usually embeds the front via `{{FrontSide}}`, so speech
    /// extraction on the back skips `README` blocks nested in `.from-front`.
    #[must_use]
    pub fn from_html(id: CardId, front_html: &str, back_html: &str) -> Self {
        let front = html::speech_text(front_html, false);
        let back = html::speech_text(back_html, true);

        Self {
            id,
            front_text: html::html_to_text(front_html),
            back_text: html::html_to_text(back_html),
            front_speech_text: front.text,
            back_speech_text: back.text,
            front_language: front.language,
            back_language: back.language,
        }
    }
}

/// New/due counts for a deck
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckStats {
    #[serde(default)]
    pub new: u32,
    #[serde(default)]
    pub due: u32,
}
