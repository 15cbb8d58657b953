//! Control phrases recognized ahead of grade/question classification

use serde::Serialize;

use super::locale::Locale;
use super::normalize;

/// Session control spoken by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    Confirm,
    Cancel,
    Delete,
    Undo,
    ReadAnswer,
    Repeat,
    Stop,
}

type PhraseTable = &'static [(VoiceCommand, &'static [&'static str])];

const ENGLISH: PhraseTable = &[
    (
        VoiceCommand::Confirm,
        &[
            "confirm", "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "do it", "go ahead",
            "yes please",
        ],
    ),
    (
        VoiceCommand::Cancel,
        &["cancel", "no", "nope", "never mind", "nevermind", "go back", "no thanks"],
    ),
    (
        VoiceCommand::Delete,
        &[
            "delete", "delete this", "delete card", "delete this card", "delete the card",
            "delete note", "delete this note", "suspend", "suspend card", "suspend this card",
        ],
    ),
    (
        VoiceCommand::Undo,
        &["undo", "undo that", "undo grade", "undo last grade", "take that back"],
    ),
    (
        VoiceCommand::ReadAnswer,
        &[
            "read answer", "read the answer", "show answer", "show the answer", "tell me the answer",
            "whats the answer", "what is the answer", "i dont know", "no idea", "skip",
        ],
    ),
    (
        VoiceCommand::Repeat,
        &["repeat", "say that again", "repeat that", "repeat the question", "come again"],
    ),
    (
        VoiceCommand::Stop,
        &["stop", "quit", "exit", "goodbye", "bye", "end session", "stop session", "im done"],
    ),
];

const SPANISH: PhraseTable = &[
    (
        VoiceCommand::Confirm,
        &["confirmar", "confirmo", "si", "claro", "vale", "de acuerdo", "hazlo", "ok", "okay"],
    ),
    (
        VoiceCommand::Cancel,
        &["cancelar", "cancela", "no", "olvidalo", "dejalo", "volver", "atras"],
    ),
    (
        VoiceCommand::Delete,
        &[
            "borrar", "borra", "borrar tarjeta", "borra esta tarjeta", "eliminar", "elimina",
            "eliminar tarjeta", "suspender", "suspende", "suspender tarjeta",
        ],
    ),
    (
        VoiceCommand::Undo,
        &["deshacer", "deshaz", "deshaz eso", "deshacer nota"],
    ),
    (
        VoiceCommand::ReadAnswer,
        &[
            "lee la respuesta", "leer respuesta", "muestra la respuesta", "mostrar respuesta",
            "cual es la respuesta", "no se", "ni idea", "saltar",
        ],
    ),
    (
        VoiceCommand::Repeat,
        &["repite", "repetir", "otra vez la pregunta", "repite la pregunta", "como dijiste"],
    ),
    (
        VoiceCommand::Stop,
        &["para", "parar", "detente", "salir", "adios", "terminar", "termina la sesion", "ya termine"],
    ),
];

const fn phrases(locale: Locale) -> PhraseTable {
    match locale {
        Locale::En => ENGLISH,
        Locale::Es => SPANISH,
    }
}

/// Match a whole utterance against the locale's control phrases
///
/// Fillers and politeness words around the phrase are ignored. Partial matches
/// do not count: "no idea what that means" is not a cancel.
#[must_use]
pub fn recognize_command(utterance: &str, locale: Locale) -> Option<VoiceCommand> {
    let table = locale.table();
    let normalized = normalize(utterance);
    let core = normalized
        .split(' ')
        .filter(|t| !t.is_empty() && !table.fillers.contains(t))
        .collect::<Vec<_>>();
    let core = strip_politeness(core, table.politeness);

    if core.is_empty() {
        return None;
    }
    let joined = core.join(" ");

    phrases(locale)
        .iter()
        .find(|(_, list)| list.contains(&joined.as_str()))
        .map(|(command, _)| *command)
}

fn strip_politeness<'a>(mut core: Vec<&'a str>, politeness: &[&'static str]) -> Vec<&'a str> {
    loop {
        let before = core.len();
        for phrase in politeness {
            let words: Vec<&str> = phrase.split(' ').collect();
            if core.len() > words.len() && core.ends_with(&words) {
                core.truncate(core.len() - words.len());
            }
            if core.len() > words.len() && core.starts_with(&words) {
                core.drain(..words.len());
            }
        }
        if core.len() == before {
            return core;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_commands() {
        let en = |t: &str| recognize_command(t, Locale::En);
        assert_eq!(en("Confirm."), Some(VoiceCommand::Confirm));
        assert_eq!(en("yes please"), Some(VoiceCommand::Confirm));
        assert_eq!(en("uh, no"), Some(VoiceCommand::Cancel));
        assert_eq!(en("Delete this card"), Some(VoiceCommand::Delete));
        assert_eq!(en("undo that please"), Some(VoiceCommand::Undo));
        assert_eq!(en("what's the answer?"), Some(VoiceCommand::ReadAnswer));
        assert_eq!(en("say that again"), Some(VoiceCommand::Repeat));
        assert_eq!(en("stop"), Some(VoiceCommand::Stop));
    }

    #[test]
    fn grade_words_are_not_commands() {
        assert_eq!(recognize_command("again", Locale::En), None);
        assert_eq!(recognize_command("good", Locale::En), None);
        assert_eq!(recognize_command("3", Locale::En), None);
    }

    #[test]
    fn partial_phrases_do_not_match() {
        assert_eq!(recognize_command("no idea what that means", Locale::En), None);
        assert_eq!(recognize_command("please", Locale::En), None);
        assert_eq!(recognize_command("", Locale::En), None);
    }

    #[test]
    fn spanish_commands() {
        let es = |t: &str| recognize_command(t, Locale::Es);
        assert_eq!(es("Sí"), Some(VoiceCommand::Confirm));
        assert_eq!(es("cancelar por favor"), Some(VoiceCommand::Cancel));
        assert_eq!(es("borra esta tarjeta"), Some(VoiceCommand::Delete));
        assert_eq!(es("¿Cuál es la respuesta?"), Some(VoiceCommand::ReadAnswer));
        assert_eq!(es("adiós"), Some(VoiceCommand::Stop));
        assert_eq!(es("otra vez"), None);
    }
}
