//! Utterance classification
//!
//! Maps a finished utterance to a grade, a follow-up question, or nothing
//! actionable. Grades carry an explicit `unambiguous` bit: only unambiguous
//! grades may be submitted without asking the user to confirm.
//!
//! Rules, first match wins:
//! 1. numerals, bare or after a grading verb ("3", "grade 3")
//! 2. spelled-out numbers, bare or after a grading verb ("grade three")
//! 3. grade words ("good"): unambiguous when alone, after a grading verb or in
//!    a two-token utterance; ambiguous when softened by a hedge ("that was good")
//! 4. question openers, a question mark, or three or more tokens
//! 5. anything else is ambiguous

mod commands;
mod locale;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub use commands::{VoiceCommand, recognize_command};
pub use locale::{ENGLISH, Locale, LocaleTable, SPANISH};

use crate::card::Ease;

/// Longest utterance still considered a hedged grade rather than a sentence
const MAX_HEDGED_TOKENS: usize = 6;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// What the user meant by an utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// A grade for the current card
    Grade { ease: Ease, unambiguous: bool },
    /// A follow-up question about the card
    Question { text: String },
    /// Nothing actionable
    Ambiguous,
}

/// Stateless classifier bound to one locale's tables
#[derive(Debug, Clone, Copy)]
pub struct IntentClassifier {
    locale: Locale,
}

impl IntentClassifier {
    #[must_use]
    pub const fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// Classify a raw utterance
    #[must_use]
    pub fn classify(&self, utterance: &str) -> Intent {
        classify(utterance, self.locale)
    }

    /// Whether the utterance holds nothing but hesitation sounds
    #[must_use]
    pub fn is_filler(&self, utterance: &str) -> bool {
        let table = self.locale.table();
        let normalized = normalize(utterance);
        let tokens = tokens(&normalized);
        strip_phrases(&tokens, table.fillers).is_empty()
    }
}

/// Classify a raw utterance with the given locale's tables
#[must_use]
pub fn classify(utterance: &str, locale: Locale) -> Intent {
    let table = locale.table();
    let has_question_mark = utterance.contains('?') || utterance.contains('¿');

    let normalized = normalize(utterance);
    let all = tokens(&normalized);
    let core = strip_phrases(&strip_phrases(&all, table.fillers), table.politeness);

    if core.is_empty() {
        return Intent::Ambiguous;
    }

    if let Some(ease) = numeral_command(&core, table) {
        return Intent::Grade {
            ease,
            unambiguous: true,
        };
    }

    if let Some(ease) = number_word_command(&core, table) {
        return Intent::Grade {
            ease,
            unambiguous: true,
        };
    }

    let question_shaped = has_question_mark || starts_with_any(&core, table.question_starts);

    if !has_question_mark
        && let Some(grade) = grade_word(&core, table, question_shaped)
    {
        return grade;
    }

    if question_shaped || core.len() >= 3 {
        return Intent::Question {
            text: utterance.trim().to_string(),
        };
    }

    Intent::Ambiguous
}

/// Lower-case, fold accents, drop apostrophes and punctuation, collapse spaces
#[must_use]
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '’' | '`'))
        .map(fold_accent)
        .collect();
    let spaced = NON_WORD.replace_all(&folded, " ");
    WHITESPACE.replace_all(spaced.trim(), " ").into_owned()
}

const fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        other => other,
    }
}

fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Remove every occurrence of the given (possibly multi-word) phrases
fn strip_phrases<'a>(tokens: &[&'a str], phrases: &[&str]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    'outer: while i < tokens.len() {
        for phrase in phrases {
            let len = phrase.split(' ').count();
            if phrase_at(tokens, i, phrase) {
                i += len;
                continue 'outer;
            }
        }
        out.push(tokens[i]);
        i += 1;
    }
    out
}

fn phrase_at(tokens: &[&str], at: usize, phrase: &str) -> bool {
    let mut i = at;
    for word in phrase.split(' ') {
        if tokens.get(i) != Some(&word) {
            return false;
        }
        i += 1;
    }
    true
}

fn contains_phrase(tokens: &[&str], phrase: &str) -> bool {
    (0..tokens.len()).any(|i| phrase_at(tokens, i, phrase))
}

fn contains_any(tokens: &[&str], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(tokens, p))
}

fn starts_with_any(tokens: &[&str], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| phrase_at(tokens, 0, p))
}

/// Whether everything besides the value is grading verbs and connectors
fn is_command_shape(rest: &[&str], table: &LocaleTable) -> bool {
    let Some((first, tail)) = rest.split_first() else {
        return true;
    };
    table.grade_verbs.contains(first)
        && tail
            .iter()
            .all(|t| table.connectors.contains(t) || table.grade_verbs.contains(t))
}

fn numeral_command(core: &[&str], table: &LocaleTable) -> Option<Ease> {
    let (last, rest) = core.split_last()?;
    let value: u8 = last.parse().ok()?;
    let ease = Ease::try_from(value).ok()?;
    is_command_shape(rest, table).then_some(ease)
}

fn number_word_command(core: &[&str], table: &LocaleTable) -> Option<Ease> {
    let (last, rest) = core.split_last()?;
    let ease = table
        .number_words
        .iter()
        .find(|(word, _)| word == last)
        .map(|(_, ease)| *ease)?;
    is_command_shape(rest, table).then_some(ease)
}

fn grade_word(core: &[&str], table: &LocaleTable, question_shaped: bool) -> Option<Intent> {
    let mut eases: Vec<Ease> = Vec::new();
    let mut remaining = core.to_vec();

    for (phrase, ease) in table.grade_words {
        if contains_phrase(&remaining, phrase) {
            remaining = strip_phrases(&remaining, &[phrase]);
            if !eases.contains(ease) {
                eases.push(*ease);
            }
        }
    }

    let [ease] = eases.as_slice() else {
        return None;
    };

    if contains_any(core, table.negations) {
        return None;
    }

    if contains_any(core, table.hedges) {
        if question_shaped || core.len() > MAX_HEDGED_TOKENS {
            return None;
        }
        return Some(Intent::Grade {
            ease: *ease,
            unambiguous: false,
        });
    }

    if is_command_shape(&remaining, table) || core.len() <= 2 {
        return Some(Intent::Grade {
            ease: *ease,
            unambiguous: true,
        });
    }

    None
}
