//! Per-locale phrase tables
//!
//! Every table is written in normalized form: lower case, accents folded,
//! apostrophes dropped (see [`super::normalize`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::card::Ease;
use crate::Error;

/// Supported interaction languages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// Phrase tables for this locale
    #[must_use]
    pub const fn table(self) -> &'static LocaleTable {
        match self {
            Self::En => &ENGLISH,
            Self::Es => &SPANISH,
        }
    }

    /// BCP 47 tag used for prompts spoken by the session itself
    #[must_use]
    pub const fn language_tag(self) -> &'static str {
        match self {
            Self::En => "en-US",
            Self::Es => "es-ES",
        }
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.split(['-', '_']).next().unwrap_or_default() {
            "en" => Ok(Self::En),
            "es" => Ok(Self::Es),
            _ => Err(Error::Config(format!("unsupported locale: {s}"))),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::En => f.write_str("en"),
            Self::Es => f.write_str("es"),
        }
    }
}

/// Words and phrases that drive classification for one language
#[derive(Debug)]
pub struct LocaleTable {
    /// Verbs that turn a number or grade word into an explicit command
    pub grade_verbs: &'static [&'static str],
    /// Glue allowed between a grading verb and its value ("mark it as good")
    pub connectors: &'static [&'static str],
    /// Spelled-out numbers 1..=4
    pub number_words: &'static [(&'static str, Ease)],
    /// Canonical grade words and synonyms
    pub grade_words: &'static [(&'static str, Ease)],
    /// Phrases that soften a grade word into a description
    pub hedges: &'static [&'static str],
    /// Words that negate a grade word ("not easy")
    pub negations: &'static [&'static str],
    /// Utterance openers that mark a question
    pub question_starts: &'static [&'static str],
    /// Hesitation sounds carrying no content
    pub fillers: &'static [&'static str],
    /// Courtesy words ignored when matching command shapes
    pub politeness: &'static [&'static str],
}

pub static ENGLISH: LocaleTable = LocaleTable {
    grade_verbs: &["grade", "mark", "rate", "score", "ease", "number", "answer", "give"],
    connectors: &["it", "as", "a", "an", "that", "this", "with", "me"],
    number_words: &[
        ("one", Ease::Again),
        ("two", Ease::Hard),
        ("three", Ease::Good),
        ("four", Ease::Easy),
    ],
    grade_words: &[
        ("again", Ease::Again),
        ("fail", Ease::Again),
        ("failed", Ease::Again),
        ("forgot", Ease::Again),
        ("wrong", Ease::Again),
        ("missed", Ease::Again),
        ("hard", Ease::Hard),
        ("difficult", Ease::Hard),
        ("tough", Ease::Hard),
        ("good", Ease::Good),
        ("correct", Ease::Good),
        ("right", Ease::Good),
        ("fine", Ease::Good),
        ("easy", Ease::Easy),
        ("simple", Ease::Easy),
        ("trivial", Ease::Easy),
    ],
    hedges: &[
        "that was",
        "it was",
        "this was",
        "that one was",
        "this one was",
        "that is",
        "this is",
        "it is",
        "thats",
        "its",
        "pretty",
        "kind of",
        "kinda",
        "sort of",
        "sorta",
        "i think",
        "i guess",
        "maybe",
        "probably",
        "fairly",
        "quite",
        "somewhat",
        "a bit",
        "a little",
        "rather",
        "mostly",
    ],
    negations: &["not", "no", "never", "isnt", "wasnt", "dont", "didnt"],
    question_starts: &[
        "what",
        "whats",
        "why",
        "how",
        "when",
        "where",
        "who",
        "which",
        "can you",
        "could you",
        "would you",
        "explain",
        "tell me",
        "is",
        "are",
        "does",
        "do",
        "did",
        "should",
        "would",
        "could",
        "can",
    ],
    fillers: &["uh", "um", "umm", "uhm", "erm", "er", "hmm", "hm", "ah", "eh", "mm", "mmm"],
    politeness: &["please", "thanks", "thank you"],
};

pub static SPANISH: LocaleTable = LocaleTable {
    grade_verbs: &["califica", "calificar", "calificacion", "nota", "marca", "marcar", "puntua", "numero", "pon"],
    connectors: &["lo", "la", "como", "con", "un", "una", "esta", "esto", "le"],
    number_words: &[
        ("uno", Ease::Again),
        ("dos", Ease::Hard),
        ("tres", Ease::Good),
        ("cuatro", Ease::Easy),
    ],
    grade_words: &[
        ("otra vez", Ease::Again),
        ("de nuevo", Ease::Again),
        ("mal", Ease::Again),
        ("falle", Ease::Again),
        ("olvide", Ease::Again),
        ("dificil", Ease::Hard),
        ("duro", Ease::Hard),
        ("bien", Ease::Good),
        ("bueno", Ease::Good),
        ("correcto", Ease::Good),
        ("facil", Ease::Easy),
        ("sencillo", Ease::Easy),
    ],
    hedges: &[
        "fue",
        "estuvo",
        "eso fue",
        "esta fue",
        "es",
        "bastante",
        "un poco",
        "mas o menos",
        "creo que",
        "quizas",
        "tal vez",
        "medio",
        "algo",
    ],
    negations: &["no", "nunca", "tampoco"],
    question_starts: &[
        "que",
        "por que",
        "como",
        "cuando",
        "donde",
        "quien",
        "cual",
        "cuales",
        "cuanto",
        "explica",
        "explicame",
        "dime",
        "puedes",
        "podrias",
    ],
    fillers: &["eh", "em", "este", "mmm", "mm", "ah", "pues", "bueno pues"],
    politeness: &["por favor", "gracias"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locale_tags() {
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("en-US".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("ES_mx".parse::<Locale>().unwrap(), Locale::Es);
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn every_ease_has_a_number_word_and_grade_word() {
        for table in [&ENGLISH, &SPANISH] {
            for ease in Ease::ALL {
                assert!(table.number_words.iter().any(|(_, e)| *e == ease));
                assert!(table.grade_words.iter().any(|(_, e)| *e == ease));
            }
        }
    }
}
